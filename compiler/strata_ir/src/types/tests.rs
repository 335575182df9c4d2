use super::*;

#[test]
fn interning_dedups() {
    let mut store = TypeStore::new();
    let t1 = store.tensor();
    let t2 = store.tensor();
    assert_eq!(t1, t2);

    let f1 = store.func(vec![t1, t1], t1);
    let f2 = store.func(vec![t1, t1], t1);
    assert_eq!(f1, f2);
}

#[test]
fn distinct_shapes_get_distinct_ids() {
    let mut store = TypeStore::new();
    let tensor = store.tensor();
    let unit = store.unit();
    let pair = store.tuple(vec![tensor, tensor]);
    assert_ne!(tensor, unit);
    assert_ne!(tensor, pair);
}

#[test]
fn fn_arity_follows_params() {
    let mut store = TypeStore::new();
    let tensor = store.tensor();
    let unary = store.func(vec![tensor], tensor);
    let binary = store.func(vec![tensor, tensor], tensor);

    assert_eq!(store.fn_arity(unary), Some(1));
    assert_eq!(store.fn_arity(binary), Some(2));
    assert_eq!(store.fn_arity(tensor), None);
    assert!(store.is_function(binary));
}

#[test]
fn structural_eq_crosses_stores() {
    let mut a = TypeStore::new();
    let mut b = TypeStore::new();

    // Intern in different orders so the raw ids differ.
    let a_tensor = a.tensor();
    let a_fn = a.func(vec![a_tensor], a_tensor);

    let b_unit = b.unit();
    let b_tensor = b.tensor();
    let b_fn = b.func(vec![b_tensor], b_tensor);

    assert_ne!(a_fn.raw(), b_fn.raw());
    assert!(a.structurally_eq(a_fn, &b, b_fn));
    assert!(!a.structurally_eq(a_fn, &b, b_unit));
    assert!(!a.structurally_eq(a_tensor, &b, b_fn));
}
