use super::*;
use strata_device::DeviceKind;

fn gpu() -> Scope {
    Scope::for_device(DeviceKind::Cuda)
}

#[test]
fn from_name_recognizes_the_dialect() {
    assert_eq!(DialectOp::from_name("on_device"), Some(DialectOp::OnDevice));
    assert_eq!(
        DialectOp::from_name("device_copy"),
        Some(DialectOp::DeviceCopy)
    );
    assert_eq!(DialectOp::from_name("shape_of"), Some(DialectOp::ShapeOf));
    assert_eq!(DialectOp::from_name("add"), None);
}

#[test]
fn on_device_round_trips_through_props() {
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let var = module.fresh_var("x", Some(tensor));
    let body = module.var_expr(var);
    let wrapped = module.on_device(body, gpu(), false);

    let props = module.on_device_props(wrapped).unwrap();
    assert_eq!(props.body, body);
    assert_eq!(props.scope, gpu());
    assert!(!props.is_fixed);

    // The call keeps the body's type.
    assert_eq!(module.arena.ty(wrapped), Some(tensor));
}

#[test]
fn device_copy_round_trips_through_props() {
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let var = module.fresh_var("x", Some(tensor));
    let body = module.var_expr(var);
    let cpu = Scope::for_device(DeviceKind::Cpu);
    let copied = module.device_copy(body, gpu(), cpu.clone());

    let props = module.device_copy_props(copied).unwrap();
    assert_eq!(props.body, body);
    assert_eq!(props.src, gpu());
    assert_eq!(props.dst, cpu);
}

#[test]
fn props_reject_plain_calls() {
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let add = module.op("add");
    let callee = module.op_expr(add);
    let var = module.fresh_var("x", Some(tensor));
    let arg = module.var_expr(var);
    let call = module.call(callee, vec![arg], Some(tensor));

    assert_eq!(module.on_device_props(call), None);
    assert_eq!(module.device_copy_props(call), None);
}

#[test]
fn maybe_on_device_skips_unconstrained_scope() {
    let mut module = Module::new();
    let var = module.fresh_var("x", None);
    let body = module.var_expr(var);
    assert_eq!(
        module.maybe_on_device(body, Scope::unconstrained(), true),
        body
    );
}

#[test]
fn maybe_on_device_never_wraps_operators_or_ctors() {
    let mut module = Module::new();
    let add = module.op("add");
    let op_ref = module.op_expr(add);
    assert_eq!(module.maybe_on_device(op_ref, gpu(), true), op_ref);

    let adt = module.declare_adt("List");
    let ctor = module.declare_ctor(adt, "Nil", vec![]);
    let ctor_ref = module.ctor_expr(ctor);
    assert_eq!(module.maybe_on_device(ctor_ref, gpu(), true), ctor_ref);
}

#[test]
fn maybe_on_device_collapses_identical_fixed_annotations() {
    let mut module = Module::new();
    let var = module.fresh_var("x", None);
    let body = module.var_expr(var);
    let once = module.maybe_on_device(body, gpu(), true);
    let twice = module.maybe_on_device(once, gpu(), true);
    assert_eq!(once, twice);

    // A different scope still wraps.
    let cpu = Scope::for_device(DeviceKind::Cpu);
    let rewrapped = module.maybe_on_device(once, cpu, true);
    assert_ne!(rewrapped, once);
}
