use proptest::prelude::*;
use shared::Rc;
use shared::rc::Weak;

#[derive(Debug, Clone)]
enum Operation {
    Clone(usize),
    DropStrong(usize),
    Downgrade(usize),
    DropWeak(usize),
    Upgrade(usize),
}

proptest! {
    // Mirror a handle-shuffling sequence against std::rc: the counters and
    // every upgrade outcome must agree at each step.
    #[test]
    fn test_rc_counters_match_std_rc(ops in proptest::collection::vec(
        prop_oneof![
            (0..8usize).prop_map(Operation::Clone),
            (0..8usize).prop_map(Operation::DropStrong),
            (0..8usize).prop_map(Operation::Downgrade),
            (0..8usize).prop_map(Operation::DropWeak),
            (0..8usize).prop_map(Operation::Upgrade),
        ],
        1..100
    )) {
        let mut strongs = vec![Rc::new(String::from("shared value"))];
        let mut std_strongs = vec![std::rc::Rc::new(String::from("shared value"))];
        let mut weaks: Vec<Weak<String>> = Vec::new();
        let mut std_weaks: Vec<std::rc::Weak<String>> = Vec::new();

        for op in ops {
            match op {
                Operation::Clone(i) => {
                    if !strongs.is_empty() {
                        let i = i % strongs.len();
                        strongs.push(strongs[i].clone());
                        std_strongs.push(std_strongs[i].clone());
                    }
                }
                Operation::DropStrong(i) => {
                    if !strongs.is_empty() {
                        let i = i % strongs.len();
                        strongs.remove(i);
                        std_strongs.remove(i);
                    }
                }
                Operation::Downgrade(i) => {
                    if !strongs.is_empty() {
                        let i = i % strongs.len();
                        weaks.push(strongs[i].downgrade());
                        std_weaks.push(std::rc::Rc::downgrade(&std_strongs[i]));
                    }
                }
                Operation::DropWeak(i) => {
                    if !weaks.is_empty() {
                        let i = i % weaks.len();
                        weaks.remove(i);
                        std_weaks.remove(i);
                    }
                }
                Operation::Upgrade(i) => {
                    if !weaks.is_empty() {
                        let i = i % weaks.len();
                        let mine = weaks[i].upgrade();
                        let theirs = std_weaks[i].upgrade();
                        prop_assert_eq!(mine.is_some(), theirs.is_some(), "upgrade outcome diverged");
                        if let (Some(a), Some(b)) = (mine, theirs) {
                            prop_assert_eq!(&*a, &*b);
                            strongs.push(a);
                            std_strongs.push(b);
                        }
                    }
                }
            }

            if !strongs.is_empty() {
                prop_assert_eq!(
                    strongs[0].strong_count(),
                    std::rc::Rc::strong_count(&std_strongs[0]),
                    "strong counters diverged"
                );
                prop_assert_eq!(
                    strongs[0].weak_count(),
                    std::rc::Rc::weak_count(&std_strongs[0]),
                    "weak counters diverged"
                );
            }
        }

        // Once the last strong handle is gone, no weak handle revives the
        // value on either side.
        strongs.clear();
        std_strongs.clear();
        for (mine, theirs) in weaks.iter().zip(&std_weaks) {
            prop_assert!(mine.upgrade().is_none());
            prop_assert!(theirs.upgrade().is_none());
        }
    }
}
