//! Integration tests for snex-core.
//!
//! Covers the path from a registered class through the compiler boundary to a
//! running node, overload resolution across nested classes, and the exception
//! registry as a network uses it.

use std::sync::Arc;

use snex_core::{
    AudioBuffer, ClassDefinition, DataType, ErrorCode, ExceptionHandler, ExternalData,
    FunctionClass, FunctionData, FunctionPointer, HiseEvent, JitCompiledNode, NativeClassCompiler,
    NativeType, NodeError, NodeObject, ObjectMemory, ParameterRange, PrepareSpecs, ProcessData,
    ResolveError, SnexCompiler, Symbol, TypeInfo, Value,
};

// ============================================================================
// Compiled node lifecycle
// ============================================================================

fn process(obj: &mut ObjectMemory, data: &mut ProcessData<'_>) {
    let gain = obj.float(0);
    for ch in data.channels_mut() {
        ch.iter_mut().for_each(|s| *s *= gain);
    }
}

fn frame(obj: &mut ObjectMemory, frame: &mut [f32]) {
    let gain = obj.float(0);
    frame.iter_mut().for_each(|s| *s *= gain);
}

fn prepare(obj: &mut ObjectMemory, specs: &PrepareSpecs) {
    obj.set_double(1, specs.sample_rate);
}

fn set_gain(obj: &mut ObjectMemory, value: f64) {
    obj.set_double(0, value);
}

fn table_lookup(obj: &mut ObjectMemory, data: &ExternalData, _index: usize) {
    if let Some(value) = data.as_table().and_then(|t| t.interpolate(1.0)) {
        obj.set_float(0, value);
    }
}

fn compiler() -> NativeClassCompiler {
    let mut compiler = NativeClassCompiler::new();
    compiler.register(
        ClassDefinition::new("Gain")
            .with_member("gain", NativeType::Float, Value::Float(1.0))
            .with_member("sampleRate", NativeType::Double, Value::Double(0.0))
            .with_prepare(prepare)
            .with_process(2, process)
            .with_process_frame(2, frame)
            .with_parameter("Gain", ParameterRange::new(0.0, 2.0), 1.0, set_gain)
            .with_external_data(DataType::Table, 1, table_lookup),
    );
    compiler
}

const CODE: &str = "struct Gain\n{\n    void process(ProcessData<2>& d) {}\n};\n";

#[test]
fn compiled_node_processes_after_prepare() {
    let class = compiler().compile(CODE, "Gain", 2).unwrap();
    let mut node = JitCompiledNode::new(class).unwrap();

    node.prepare(&PrepareSpecs::new(48000.0, 64, 2)).unwrap();
    assert_eq!(node.object().double(1), 48000.0);

    node.set_parameter(0, 0.5);
    let mut buffer = AudioBuffer::from_channels(&[vec![1.0; 8], vec![-1.0; 8]]);
    node.process(&mut buffer.as_process_data());
    assert_eq!(buffer.channel(0), &[0.5; 8]);
    assert_eq!(buffer.channel(1), &[-0.5; 8]);
}

#[test]
fn wrong_channel_count_is_a_located_compile_error() {
    let err = compiler().compile(CODE, "Gain", 1).unwrap_err();
    assert_eq!((err.line, err.column), (3, 10));
    assert_eq!(
        err.to_node_error().message(),
        "Compilation error at Line 3, Column 10"
    );
}

#[test]
fn channel_mismatch_scenario() {
    let class = compiler().compile(CODE, "Gain", 2).unwrap();
    let mut node: Box<dyn NodeObject> = Box::new(JitCompiledNode::new(class).unwrap());

    let mut handler = ExceptionHandler::new();
    if let Err(e) = node.prepare(&PrepareSpecs::new(44100.0, 512, 1)) {
        handler.add_error("gain", e);
    }

    assert!(handler.is_bypassed("gain"));
    assert_eq!(
        handler.error("gain"),
        Some(NodeError::new(ErrorCode::ChannelMismatch, 2, 1))
    );

    let mut buffer = AudioBuffer::from_channels(&[vec![0.25; 4]]);
    node.process(&mut buffer.as_process_data());
    assert_eq!(buffer.channel(0), &[0.25; 4]);
}

#[test]
fn table_binding_reaches_instance() {
    let class = compiler().compile(CODE, "Gain", 2).unwrap();
    let mut node = JitCompiledNode::new(class).unwrap();
    assert_eq!(node.data_slots(DataType::Table), 1);

    let table = ExternalData::create(DataType::Table);
    if let Some(t) = table.as_table() {
        t.set_values(vec![0.0, 0.75]);
    }
    node.set_external_data(&table, 0);
    assert_eq!(node.object().float(0), 0.75);
}

#[test]
fn events_are_ignored_until_prepared() {
    fn count(obj: &mut ObjectMemory, _: &mut HiseEvent) {
        obj.set_int(0, obj.int(0) + 1);
    }
    fn silent(_: &mut ObjectMemory, _: &mut ProcessData<'_>) {}
    fn silent_frame(_: &mut ObjectMemory, _: &mut [f32]) {}
    let class = ClassDefinition::new("Counter")
        .with_member("events", NativeType::Integer, Value::Integer(0))
        .with_process(1, silent)
        .with_process_frame(1, silent_frame)
        .with_handle_event(count)
        .build(1)
        .unwrap();

    let mut node = JitCompiledNode::new(Arc::new(class)).unwrap();
    let mut e = HiseEvent::note_on(1, 60, 127);
    node.handle_event(&mut e);
    node.prepare(&PrepareSpecs::new(44100.0, 64, 1)).unwrap();
    node.handle_event(&mut e);
    assert_eq!(node.object().int(0), 1);
}

// ============================================================================
// Overload resolution
// ============================================================================

fn f_int(_: &[Value]) -> Value {
    Value::Integer(1)
}

fn f_double(_: &[Value]) -> Value {
    Value::Double(2.0)
}

#[test]
fn int_and_double_overloads_reject_float() {
    let mut c = FunctionClass::new("T");
    c.add_function(
        FunctionData::new("f", NativeType::Integer)
            .with_arg("x", NativeType::Integer)
            .with_function(FunctionPointer::Free(f_int)),
    );
    c.add_function(
        FunctionData::new("f", NativeType::Double)
            .with_arg("x", NativeType::Double)
            .with_function(FunctionPointer::Free(f_double)),
    );

    let err = c
        .resolve(&Symbol::parse("T::f"), &[TypeInfo::native(NativeType::Float)])
        .unwrap_err();
    assert_eq!(err.to_string(), "no matching overload for T::f(float)");
    assert!(matches!(err, ResolveError::NoMatch { .. }));

    let f = c
        .resolve(&Symbol::parse("T::f"), &[TypeInfo::native(NativeType::Double)])
        .unwrap();
    assert_eq!(f.call(&[Value::Double(0.0)]), Ok(Value::Double(2.0)));
}

#[test]
fn nested_classes_contribute_matches() {
    let mut inner = FunctionClass::new(Symbol::parse("Outer::Inner"));
    inner.add_function(
        FunctionData::new("g", NativeType::Integer).with_function(FunctionPointer::Free(f_int)),
    );
    let mut outer = FunctionClass::new("Outer");
    outer.add_sub_function_class(inner);

    let g = Symbol::parse("Outer::Inner::g");
    let mut matches = Vec::new();
    outer.add_matching_functions(&mut matches, &g);
    assert_eq!(matches.len(), 1);
    assert!(outer.has_function(&g));
}
