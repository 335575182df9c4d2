use super::*;

use proptest::prelude::*;

#[test]
fn unconstrained_scope_has_no_components() {
    let scope = Scope::unconstrained();
    assert!(scope.is_fully_unconstrained());
    assert_eq!(scope.device, None);
    assert_eq!(scope.target, None);
}

#[test]
fn device_scope_is_not_unconstrained() {
    assert!(!Scope::for_device(DeviceKind::Cuda).is_fully_unconstrained());
}

#[test]
fn join_with_unconstrained_is_identity() {
    let gpu = Scope::for_virtual_device(DeviceKind::Cuda, 0);
    assert_eq!(gpu.join(&Scope::unconstrained()), Some(gpu.clone()));
    assert_eq!(Scope::unconstrained().join(&gpu), Some(gpu));
}

#[test]
fn join_merges_disjoint_components() {
    let device_only = Scope::for_device(DeviceKind::Cpu);
    let index_only = Scope {
        virtual_id: Some(1),
        ..Scope::default()
    };
    let joined = device_only.join(&index_only).unwrap();
    assert_eq!(joined.device, Some(DeviceKind::Cpu));
    assert_eq!(joined.virtual_id, Some(1));
}

#[test]
fn join_conflicting_devices_fails() {
    let cpu = Scope::for_device(DeviceKind::Cpu);
    let gpu = Scope::for_device(DeviceKind::Cuda);
    assert_eq!(cpu.join(&gpu), None);
}

#[test]
fn join_conflicting_virtual_ids_fails() {
    let dev0 = Scope::for_virtual_device(DeviceKind::Cuda, 0);
    let dev1 = Scope::for_virtual_device(DeviceKind::Cuda, 1);
    assert_eq!(dev0.join(&dev1), None);
}

#[test]
fn join_conflicting_memory_scopes_fails() {
    let global = Scope {
        memory: Some("global".to_string()),
        ..Scope::default()
    };
    let texture = Scope {
        memory: Some("texture".to_string()),
        ..Scope::default()
    };
    assert_eq!(global.join(&texture), None);
}

#[test]
fn display_is_compact() {
    assert_eq!(Scope::unconstrained().to_string(), "?");
    assert_eq!(
        Scope::for_virtual_device(DeviceKind::Cuda, 0).to_string(),
        "(cuda, 0)"
    );
    assert_eq!(Scope::for_device(DeviceKind::Cpu).to_string(), "(cpu, ?)");
}

// ========================================
// Join algebra
// ========================================

fn arb_scope() -> impl Strategy<Value = Scope> {
    (
        proptest::option::of(prop_oneof![
            Just(DeviceKind::Cpu),
            Just(DeviceKind::Cuda),
            Just(DeviceKind::Vulkan),
        ]),
        proptest::option::of(0u32..3),
        proptest::option::of(prop_oneof![
            Just("global".to_string()),
            Just("texture".to_string()),
        ]),
        proptest::option::of((0u32..3).prop_map(TargetId::from_raw)),
    )
        .prop_map(|(device, virtual_id, memory, target)| Scope {
            device,
            virtual_id,
            memory,
            target,
        })
}

proptest! {
    #[test]
    fn join_is_commutative(a in arb_scope(), b in arb_scope()) {
        prop_assert_eq!(a.join(&b), b.join(&a));
    }

    #[test]
    fn join_is_idempotent(a in arb_scope()) {
        prop_assert_eq!(a.join(&a), Some(a.clone()));
    }

    #[test]
    fn join_is_associative(a in arb_scope(), b in arb_scope(), c in arb_scope()) {
        let left = a.join(&b).and_then(|ab| ab.join(&c));
        let right = b.join(&c).and_then(|bc| a.join(&bc));
        prop_assert_eq!(left, right);
    }
}
