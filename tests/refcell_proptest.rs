use proptest::prelude::*;
use shared::RefCell;

#[derive(Debug, Clone)]
enum Operation {
    Borrow,
    BorrowMut,
    DropOldest,
    Set(u8),
}

proptest! {
    // Drive the same operation sequence against this crate's RefCell and
    // std's, holding live guards in between: every try_borrow outcome and
    // every observed value must agree.
    #[test]
    fn test_refcell_matches_std_refcell(ops in proptest::collection::vec(
        prop_oneof![
            Just(Operation::Borrow),
            Just(Operation::BorrowMut),
            Just(Operation::DropOldest),
            any::<u8>().prop_map(Operation::Set),
        ],
        1..100
    )) {
        let cell = RefCell::new(0u8);
        let std_cell = std::cell::RefCell::new(0u8);

        let mut shared = Vec::new();
        let mut std_shared = Vec::new();
        let mut exclusive = Vec::new();
        let mut std_exclusive = Vec::new();

        for op in ops {
            match op {
                Operation::Borrow => {
                    let mine = cell.try_borrow();
                    let theirs = std_cell.try_borrow();
                    prop_assert_eq!(mine.is_ok(), theirs.is_ok(), "shared borrow admission diverged");
                    if let (Ok(a), Ok(b)) = (mine, theirs) {
                        prop_assert_eq!(*a, *b);
                        shared.push(a);
                        std_shared.push(b);
                    }
                }
                Operation::BorrowMut => {
                    let mine = cell.try_borrow_mut();
                    let theirs = std_cell.try_borrow_mut();
                    prop_assert_eq!(mine.is_ok(), theirs.is_ok(), "exclusive borrow admission diverged");
                    if let (Ok(a), Ok(b)) = (mine, theirs) {
                        exclusive.push(a);
                        std_exclusive.push(b);
                    }
                }
                Operation::DropOldest => {
                    if !shared.is_empty() {
                        shared.remove(0);
                        std_shared.remove(0);
                    } else if !exclusive.is_empty() {
                        exclusive.remove(0);
                        std_exclusive.remove(0);
                    }
                }
                Operation::Set(v) => {
                    let mine = cell.try_borrow_mut();
                    let theirs = std_cell.try_borrow_mut();
                    prop_assert_eq!(mine.is_ok(), theirs.is_ok(), "write admission diverged");
                    if let (Ok(mut a), Ok(mut b)) = (mine, theirs) {
                        *a = v;
                        *b = v;
                    }
                }
            }
        }

        // Releasing every guard must always restore full access.
        shared.clear();
        std_shared.clear();
        exclusive.clear();
        std_exclusive.clear();
        prop_assert_eq!(*cell.borrow_mut(), *std_cell.borrow_mut());
    }
}
