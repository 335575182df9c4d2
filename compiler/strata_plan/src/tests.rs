//! End-to-end planner scenarios.

use crate::{plan_devices, PlanError};

use pretty_assertions::assert_eq;
use strata_device::{CompilationConfig, DeviceKind, Scope, Target};
use strata_ir::{
    expr_to_string, module_structurally_eq, ExprKind, FnAttrs, Module,
};

fn config() -> CompilationConfig {
    CompilationConfig::new(
        vec![
            Target::new(DeviceKind::Cpu, "llvm"),
            Target::new(DeviceKind::Cuda, "cuda"),
        ],
        Scope::for_device(DeviceKind::Cpu),
        Scope::for_device(DeviceKind::Cpu),
    )
}

fn cpu(config: &CompilationConfig) -> Scope {
    config.canonical(&Scope::for_device(DeviceKind::Cpu))
}

fn gpu(config: &CompilationConfig) -> Scope {
    config.canonical(&Scope::for_device(DeviceKind::Cuda))
}

fn main_function(module: &Module) -> &strata_ir::FunctionNode {
    let (_, function) = module.functions()[0];
    let ExprKind::Function(node) = module.arena.kind(function) else {
        panic!("expected a function definition");
    };
    node
}

#[test]
fn tail_annotation_pins_the_whole_primitive() {
    // fn(x, y) { on_device(add(x, y), gpu) } with default cpu: the tail
    // annotation is fixed by normalization and pulls parameters, call, and
    // result onto the GPU; no annotation survives.
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let x = module.fresh_var("x", Some(tensor));
    let y = module.fresh_var("y", Some(tensor));
    let add = module.op("add");
    let add_ref = module.op_expr(add);
    let x_use = module.var_expr(x);
    let y_use = module.var_expr(y);
    let sum = module.call(add_ref, vec![x_use, y_use], Some(tensor));
    let body = module.on_device(sum, Scope::for_device(DeviceKind::Cuda), false);
    let function = module.function(vec![x, y], body, FnAttrs::default());
    let main = module.declare_global("main");
    module.define(main, function);

    let config = config();
    let planned = plan_devices(module, &config).unwrap();

    let node = main_function(&planned);
    assert_eq!(node.attrs.param_scopes, Some(vec![gpu(&config), gpu(&config)]));
    assert_eq!(node.attrs.result_scope, Some(gpu(&config)));
    let rendered = expr_to_string(&planned, node.body);
    assert_eq!(rendered, "add(%x, %y)");
}

#[test]
fn argument_annotation_creates_a_boundary() {
    // fn(x, y) { add(x, on_device(y, gpu)) } with default cpu: the add runs
    // on the default scope, y stays on the GPU, and the transition the
    // annotation allowed becomes an explicit copy.
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let x = module.fresh_var("x", Some(tensor));
    let y = module.fresh_var("y", Some(tensor));
    let add = module.op("add");
    let add_ref = module.op_expr(add);
    let x_use = module.var_expr(x);
    let y_use = module.var_expr(y);
    let annotated = module.on_device(y_use, Scope::for_device(DeviceKind::Cuda), false);
    let body = module.call(add_ref, vec![x_use, annotated], Some(tensor));
    let function = module.function(vec![x, y], body, FnAttrs::default());
    let main = module.declare_global("main");
    module.define(main, function);

    let config = config();
    let planned = plan_devices(module, &config).unwrap();

    let node = main_function(&planned);
    assert_eq!(node.attrs.param_scopes, Some(vec![cpu(&config), gpu(&config)]));
    assert_eq!(node.attrs.result_scope, Some(cpu(&config)));

    let ExprKind::Call(call) = planned.arena.kind(node.body) else {
        panic!("expected the add call");
    };
    assert!(matches!(planned.arena.kind(call.args[0]), ExprKind::Var(_)));
    let copy = planned.device_copy_props(call.args[1]).unwrap();
    assert_eq!(copy.src, gpu(&config));
    assert_eq!(copy.dst, cpu(&config));
    let inner = planned.on_device_props(copy.body).unwrap();
    assert!(inner.is_fixed);
    assert_eq!(inner.scope, gpu(&config));
    assert!(matches!(planned.arena.kind(inner.body), ExprKind::Var(_)));
}

/// `fn() { let a = on_device(heavy(), gpu); light(on_device(a, gpu)) }`:
/// a GPU-pinned binding consumed by a defaulted (CPU) primitive.
fn heterogeneous_let_module() -> Module {
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let a = module.fresh_var("a", Some(tensor));
    let heavy = module.op("heavy");
    let light = module.op("light");

    let heavy_ref = module.op_expr(heavy);
    let heavy_call = module.call(heavy_ref, vec![], Some(tensor));
    let value = module.on_device(heavy_call, Scope::for_device(DeviceKind::Cuda), false);

    let a_use = module.var_expr(a);
    let arg = module.on_device(a_use, Scope::for_device(DeviceKind::Cuda), false);
    let light_ref = module.op_expr(light);
    let light_call = module.call(light_ref, vec![arg], Some(tensor));

    let body = module.let_(a, value, light_call);
    let function = module.function(vec![], body, FnAttrs::default());
    let main = module.declare_global("main");
    module.define(main, function);
    module
}

#[test]
fn heterogeneous_let_inserts_a_copy_at_the_use() {
    let config = config();
    let planned = plan_devices(heterogeneous_let_module(), &config).unwrap();

    // Expected:
    //   fn() { let a = on_device(heavy(), gpu, fixed);
    //          light(device_copy(on_device(a, gpu, fixed), gpu, cpu)) }
    //   with result_scope = cpu.
    let expected = {
        let mut module = Module::new();
        let tensor = module.types.tensor();
        let a = module.fresh_var("a", Some(tensor));
        let heavy = module.op("heavy");
        let light = module.op("light");

        let heavy_ref = module.op_expr(heavy);
        let heavy_call = module.call(heavy_ref, vec![], Some(tensor));
        let value = module.on_device(heavy_call, gpu(&config), true);

        let a_use = module.var_expr(a);
        let annotated = module.on_device(a_use, gpu(&config), true);
        let copied = module.device_copy(annotated, gpu(&config), cpu(&config));
        let light_ref = module.op_expr(light);
        let light_call = module.call(light_ref, vec![copied], Some(tensor));

        let body = module.let_(a, value, light_call);
        let attrs = FnAttrs {
            primitive: false,
            param_scopes: Some(vec![]),
            result_scope: Some(cpu(&config)),
        };
        let function = module.function(vec![], body, attrs);
        let main = module.declare_global("main");
        module.define(main, function);
        module
    };

    assert!(
        module_structurally_eq(&planned, &expected),
        "planned:  {}\nexpected: {}",
        expr_to_string(&planned, planned.functions()[0].1),
        expr_to_string(&expected, expected.functions()[0].1),
    );
}

#[test]
fn planning_is_idempotent() {
    let config = config();
    let once = plan_devices(heterogeneous_let_module(), &config).unwrap();
    let twice = plan_devices(once.clone(), &config).unwrap();
    assert!(
        module_structurally_eq(&once, &twice),
        "once:  {}\ntwice: {}",
        expr_to_string(&once, once.functions()[0].1),
        expr_to_string(&twice, twice.functions()[0].1),
    );
}

#[test]
fn functions_returned_from_functions_are_planned() {
    // let f = fn(x, y) { add(x, on_device(y, gpu)) };
    // let g = fn(h, z) { h(z, z) };
    // g(f, b)
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let fn_ty = module.types.func(vec![tensor, tensor], tensor);
    let g_ty = module.types.func(vec![fn_ty, tensor], tensor);

    let x = module.fresh_var("x", Some(tensor));
    let y = module.fresh_var("y", Some(tensor));
    let add = module.op("add");
    let add_ref = module.op_expr(add);
    let x_use = module.var_expr(x);
    let y_use = module.var_expr(y);
    let annotated = module.on_device(y_use, Scope::for_device(DeviceKind::Cuda), false);
    let f_body = module.call(add_ref, vec![x_use, annotated], Some(tensor));
    let f_fn = module.function(vec![x, y], f_body, FnAttrs::default());

    let h = module.fresh_var("h", Some(fn_ty));
    let z = module.fresh_var("z", Some(tensor));
    let h_use = module.var_expr(h);
    let z_use_a = module.var_expr(z);
    let z_use_b = module.var_expr(z);
    let g_body = module.call(h_use, vec![z_use_a, z_use_b], Some(tensor));
    let g_fn = module.function(vec![h, z], g_body, FnAttrs::default());

    let b = module.fresh_var("b", Some(tensor));
    let f_var = module.fresh_var("f", Some(fn_ty));
    let g_var = module.fresh_var("g", Some(g_ty));
    let g_use = module.var_expr(g_var);
    let f_use = module.var_expr(f_var);
    let b_use = module.var_expr(b);
    let call = module.call(g_use, vec![f_use, b_use], Some(tensor));
    let inner_let = module.let_(g_var, g_fn, call);
    let outer_let = module.let_(f_var, f_fn, inner_let);
    let main_fn = module.function(vec![b], outer_let, FnAttrs::default());
    let main = module.declare_global("main");
    module.define(main, main_fn);

    let config = config();
    let planned = plan_devices(module, &config).unwrap();

    // Everything is pulled onto the GPU by the single annotation inside f.
    let node = main_function(&planned);
    assert_eq!(node.attrs.param_scopes, Some(vec![gpu(&config)]));
    assert_eq!(node.attrs.result_scope, Some(gpu(&config)));

    let ExprKind::Let(f_binding) = planned.arena.kind(node.body) else {
        panic!("expected the f binding");
    };
    let ExprKind::Function(f_node) = planned.arena.kind(f_binding.value) else {
        panic!("expected f's lambda");
    };
    assert_eq!(
        f_node.attrs.param_scopes,
        Some(vec![gpu(&config), gpu(&config)])
    );
    assert_eq!(f_node.attrs.result_scope, Some(gpu(&config)));

    let ExprKind::Let(g_binding) = planned.arena.kind(f_binding.body) else {
        panic!("expected the g binding");
    };
    let ExprKind::Function(g_node) = planned.arena.kind(g_binding.value) else {
        panic!("expected g's lambda");
    };
    // g's first parameter is higher-order; its attribute records the
    // parameter's (result) scope.
    assert_eq!(
        g_node.attrs.param_scopes,
        Some(vec![gpu(&config), gpu(&config)])
    );
    assert_eq!(g_node.attrs.result_scope, Some(gpu(&config)));

    // No annotation or copy survives: the module is homogeneous on the GPU.
    let rendered = expr_to_string(&planned, node.body);
    assert!(!rendered.contains("on_device"), "got {rendered}");
    assert!(!rendered.contains("device_copy"), "got {rendered}");
}

#[test]
fn shapes_stay_on_the_host() {
    // fn(x) { shape_of(on_device(x, gpu, fixed)) }: the tensor is on the
    // GPU, its shape on the host.
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let x = module.fresh_var("x", Some(tensor));
    let shape_of = module.op("shape_of");
    let shape_ref = module.op_expr(shape_of);
    let x_use = module.var_expr(x);
    let pinned = module.on_device(x_use, Scope::for_device(DeviceKind::Cuda), true);
    let body = module.call(shape_ref, vec![pinned], Some(tensor));
    let function = module.function(vec![x], body, FnAttrs::default());
    let main = module.declare_global("main");
    module.define(main, function);

    let config = config();
    let planned = plan_devices(module, &config).unwrap();

    let node = main_function(&planned);
    assert_eq!(node.attrs.param_scopes, Some(vec![gpu(&config)]));
    assert_eq!(node.attrs.result_scope, Some(cpu(&config)));

    // The GPU argument keeps a fixed annotation since the call context is
    // the host scope; no copy is inserted for shape queries.
    let ExprKind::Call(call) = planned.arena.kind(node.body) else {
        panic!("expected the shape_of call");
    };
    let props = planned.on_device_props(call.args[0]).unwrap();
    assert!(props.is_fixed);
    assert_eq!(props.scope, gpu(&config));
    let rendered = expr_to_string(&planned, node.body);
    assert!(!rendered.contains("device_copy"), "got {rendered}");
}

#[test]
fn conflicting_constraints_are_fatal() {
    // on_device(on_device(x, gpu, fixed), cpu, fixed) demands two scopes
    // for one expression.
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let x = module.fresh_var("x", Some(tensor));
    let x_use = module.var_expr(x);
    let inner = module.on_device(x_use, Scope::for_device(DeviceKind::Cuda), true);
    let outer = module.on_device(inner, Scope::for_device(DeviceKind::Cpu), true);
    let function = module.function(vec![x], outer, FnAttrs::default());
    let main = module.declare_global("main");
    module.define(main, function);

    let config = config();
    let error = plan_devices(module, &config).unwrap_err();
    assert!(matches!(error, PlanError::UnificationConflict { .. }));
    let message = error.to_string();
    assert!(message.contains("cuda"), "got: {message}");
    assert!(message.contains("cpu"), "got: {message}");
}

#[test]
fn missing_default_is_fatal() {
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let x = module.fresh_var("x", Some(tensor));
    let y = module.fresh_var("y", Some(tensor));
    let add = module.op("add");
    let add_ref = module.op_expr(add);
    let x_use = module.var_expr(x);
    let y_use = module.var_expr(y);
    let body = module.call(add_ref, vec![x_use, y_use], Some(tensor));
    let function = module.function(vec![x, y], body, FnAttrs::default());
    let main = module.declare_global("main");
    module.define(main, function);

    // No default primitive scope is configured.
    let config = CompilationConfig::new(
        vec![Target::new(DeviceKind::Cpu, "llvm")],
        Scope::unconstrained(),
        Scope::for_device(DeviceKind::Cpu),
    );
    let error = plan_devices(module, &config).unwrap_err();
    assert!(matches!(error, PlanError::UnresolvedDefault { .. }));
}

#[test]
fn existing_attributes_survive_replanning() {
    // A function pinned to the GPU by attributes from an earlier run stays
    // on the GPU even though the default is the CPU.
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let x = module.fresh_var("x", Some(tensor));
    let y = module.fresh_var("y", Some(tensor));
    let add = module.op("add");
    let add_ref = module.op_expr(add);
    let x_use = module.var_expr(x);
    let y_use = module.var_expr(y);
    let body = module.call(add_ref, vec![x_use, y_use], Some(tensor));
    let config = config();
    let attrs = FnAttrs {
        primitive: false,
        param_scopes: Some(vec![gpu(&config), gpu(&config)]),
        result_scope: Some(gpu(&config)),
    };
    let function = module.function(vec![x, y], body, attrs);
    let main = module.declare_global("main");
    module.define(main, function);

    let planned = plan_devices(module, &config).unwrap();
    let node = main_function(&planned);
    assert_eq!(node.attrs.param_scopes, Some(vec![gpu(&config), gpu(&config)]));
    assert_eq!(node.attrs.result_scope, Some(gpu(&config)));
}

#[test]
fn plain_module_defaults_everywhere() {
    // No annotations at all: everything lands on the default scope and the
    // output is the input with attributes attached.
    let mut module = Module::new();
    let tensor = module.types.tensor();
    let x = module.fresh_var("x", Some(tensor));
    let y = module.fresh_var("y", Some(tensor));
    let add = module.op("add");
    let mul = module.op("multiply");
    let add_ref = module.op_expr(add);
    let x_use = module.var_expr(x);
    let y_use = module.var_expr(y);
    let sum = module.call(add_ref, vec![x_use, y_use], Some(tensor));
    let t = module.fresh_var("t", Some(tensor));
    let mul_ref = module.op_expr(mul);
    let t_use_a = module.var_expr(t);
    let t_use_b = module.var_expr(t);
    let product = module.call(mul_ref, vec![t_use_a, t_use_b], Some(tensor));
    let body = module.let_(t, sum, product);
    let function = module.function(vec![x, y], body, FnAttrs::default());
    let main = module.declare_global("main");
    module.define(main, function);

    let config = config();
    let planned = plan_devices(module, &config).unwrap();

    let node = main_function(&planned);
    assert_eq!(node.attrs.param_scopes, Some(vec![cpu(&config), cpu(&config)]));
    assert_eq!(node.attrs.result_scope, Some(cpu(&config)));
    assert_eq!(
        expr_to_string(&planned, node.body),
        "let %t = add(%x, %y); multiply(%t, %t)"
    );
}
