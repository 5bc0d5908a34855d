//! Tests for the GPU probe: it never fails and warns exactly once.

use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tfbridge::gpu::gpu_available;
use tfbridge::interop::mock::{tensorflow_module, MockInterop, MockObject};
use tfbridge::interop::{ForeignError, InterpreterConfig, Value};
use tfbridge::{Binding, BindingConfig, GpuStatus};
use tracing::{Event, Level, Subscriber};
use tracing_subscriber::layer::{Context, Layer, SubscriberExt};
use tracing_subscriber::Registry;

#[derive(Clone, Default)]
struct WarnCounter(Arc<AtomicUsize>);

impl<S: Subscriber> Layer<S> for WarnCounter {
    fn on_event(&self, event: &Event<'_>, _ctx: Context<'_, S>) {
        if *event.metadata().level() == Level::WARN {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }
}

fn count_warnings<T>(f: impl FnOnce() -> T) -> (T, usize) {
    let counter = WarnCounter::default();
    let subscriber = Registry::default().with(counter.clone());
    let out = tracing::subscriber::with_default(subscriber, f);
    (out, counter.0.load(Ordering::SeqCst))
}

fn raising_device_check() -> MockObject {
    MockObject::new("module").with_object(
        "test",
        MockObject::new("module")
            .with_method("is_gpu_available", |_, _| {
                Err(ForeignError::Exception("RuntimeError: device check failed".into()))
            })
            .with_method("is_built_with_cuda", |_, _| {
                Err(ForeignError::Exception("RuntimeError: no build info".into()))
            }),
    )
}

#[test]
fn test_raising_check_is_unknown_with_one_warning() {
    for verbose in [false, true] {
        let module = raising_device_check();
        let mut out = Vec::new();
        let (status, warnings) = count_warnings(|| gpu_available(&module, verbose, &mut out));
        assert_eq!(status, GpuStatus::Unknown);
        assert_eq!(warnings, 1, "verbose = {verbose}");
    }
}

#[test]
fn test_missing_api_is_unknown() {
    let module = MockObject::new("module");
    let mut out = Vec::new();
    let (status, warnings) = count_warnings(|| gpu_available(&module, true, &mut out));
    assert_eq!(status, GpuStatus::Unknown);
    assert_eq!(status.as_option(), None);
    assert_eq!(warnings, 1);
    assert!(out.is_empty());
}

#[test]
fn test_definite_answer_has_no_warning() {
    let module = tensorflow_module("2.3.0");
    let mut out = Vec::new();
    let (status, warnings) = count_warnings(|| gpu_available(&module, true, &mut out));
    assert_eq!(status, GpuStatus::Unavailable);
    assert_eq!(warnings, 0);
}

#[test]
fn test_verbose_details_after_failed_check() {
    let module = MockObject::new("module").with_object(
        "test",
        MockObject::new("module")
            .with_method("is_gpu_available", |_, _| {
                Err(ForeignError::Exception("RuntimeError: device check failed".into()))
            })
            .with_method("is_built_with_cuda", |_, _| Ok(Value::Bool(true)))
            .with_method("gpu_device_name", |_, _| Ok(Value::Str("/device:GPU:0".into()))),
    );
    let mut out = Vec::new();
    let status = gpu_available(&module, true, &mut out);
    assert_eq!(status, GpuStatus::Unknown);
    let text = String::from_utf8(out).unwrap();
    assert!(text.contains("CUDA build: true"));
    assert!(text.contains("GPU device: /device:GPU:0"));
}

#[test]
fn test_each_verbose_line_is_independent() {
    let module = MockObject::new("module").with_object(
        "test",
        MockObject::new("module")
            .with_method("is_gpu_available", |_, _| Ok(Value::Bool(true)))
            .with_method("is_built_with_cuda", |_, _| {
                Err(ForeignError::Exception("RuntimeError: no build info".into()))
            })
            .with_method("gpu_device_name", |_, _| Ok(Value::Str("/device:GPU:0".into()))),
    );
    let mut out = Vec::new();
    let (status, warnings) = count_warnings(|| gpu_available(&module, true, &mut out));
    assert_eq!(status, GpuStatus::Available);
    assert_eq!(warnings, 0);
    assert_eq!(String::from_utf8(out).unwrap(), "GPU device: /device:GPU:0\n");
}

#[test]
fn test_binding_without_module_is_unknown() {
    let interop = Arc::new(MockInterop::new(InterpreterConfig {
        python_versions: vec![PathBuf::from("/usr/bin/python3")],
        ..Default::default()
    }));
    let binding = Binding::new(interop, BindingConfig::default());
    let mut out = Vec::new();
    let (status, warnings) = count_warnings(|| binding.gpu_available_to(true, &mut out));
    assert_eq!(status, GpuStatus::Unknown);
    assert_eq!(warnings, 1);
}
