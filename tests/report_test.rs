//! Tests for the configuration report.

use std::path::{Path, PathBuf};

use tfbridge::interop::mock::{tensorflow_module, MockInterop, MockObject};
use tfbridge::interop::InterpreterConfig;
use tfbridge::report::{self, INSTALL_HINT};
use tfbridge::{BindError, ConfigReport, Version};

fn interpreter() -> InterpreterConfig {
    InterpreterConfig {
        python: PathBuf::from("/home/ada/venv/bin/python"),
        version: "3.8".to_string(),
        python_versions: vec![PathBuf::from("/home/ada/venv/bin/python")],
        required_module_path: Some(PathBuf::from(
            "/home/ada/venv/lib/python3.8/site-packages/tensorflow",
        )),
    }
}

#[test]
fn test_report_available() {
    let interop =
        MockInterop::new(interpreter()).with_module("tensorflow", tensorflow_module("2.3.0"));
    let report = report::report(&interop, "tensorflow").unwrap();

    assert!(report.available());
    match &report {
        ConfigReport::Available {
            version,
            version_str,
            location,
            python,
            python_version,
        } => {
            assert_eq!(*version, Version::new(2, 3));
            assert_eq!(*version, "2.3".parse::<Version>().unwrap());
            assert_eq!(version_str, "2.3.0");
            assert_eq!(
                location,
                Path::new("/home/ada/venv/lib/python3.8/site-packages/tensorflow")
            );
            assert_eq!(python, Path::new("/home/ada/venv/bin/python"));
            assert_eq!(python_version, "3.8");
        }
        other => panic!("expected available report, got {other:?}"),
    }
}

#[test]
fn test_report_legacy_version_location() {
    let interop =
        MockInterop::new(interpreter()).with_module("tensorflow", tensorflow_module("1.12.3"));
    let report = report::report(&interop, "tensorflow").unwrap();
    assert_eq!(report.version(), Some(Version::new(1, 12)));
}

#[test]
fn test_report_location_falls_back_to_module_file() {
    let mut config = interpreter();
    config.required_module_path = None;
    let interop = MockInterop::new(config).with_module("tensorflow", tensorflow_module("2.3.0"));
    match report::report(&interop, "tensorflow").unwrap() {
        ConfigReport::Available { location, .. } => assert_eq!(
            location,
            PathBuf::from("/opt/venv/lib/python3.8/site-packages/tensorflow")
        ),
        other => panic!("expected available report, got {other:?}"),
    }
}

#[test]
fn test_report_unavailable() {
    let interop = MockInterop::new(interpreter());
    let report = report::report(&interop, "tensorflow").unwrap();

    assert!(!report.available());
    assert_eq!(report.version(), None);
    match &report {
        ConfigReport::Unavailable {
            python_versions,
            error_message,
        } => {
            assert_eq!(python_versions, &vec![PathBuf::from("/home/ada/venv/bin/python")]);
            assert!(error_message.contains("No module named 'tensorflow'"));
        }
        other => panic!("expected unavailable report, got {other:?}"),
    }
    assert!(report::format(&report, None).contains(INSTALL_HINT));
}

#[test]
fn test_report_is_repeatable() {
    let present =
        MockInterop::new(interpreter()).with_module("tensorflow", tensorflow_module("2.3.0"));
    assert_eq!(
        report::report(&present, "tensorflow").unwrap(),
        report::report(&present, "tensorflow").unwrap()
    );

    let absent = MockInterop::new(interpreter());
    assert_eq!(
        report::report(&absent, "tensorflow").unwrap(),
        report::report(&absent, "tensorflow").unwrap()
    );
}

#[test]
fn test_malformed_version_is_an_error() {
    let tf = MockObject::new("module").with_attr("VERSION", "2");
    let interop = MockInterop::new(interpreter()).with_module("tensorflow", tf);
    assert!(matches!(
        report::report(&interop, "tensorflow"),
        Err(BindError::InvalidVersion(_))
    ));
}

#[test]
fn test_version_projection() {
    let present =
        MockInterop::new(interpreter()).with_module("tensorflow", tensorflow_module("2.10.1"));
    assert_eq!(
        report::version(&present, "tensorflow").unwrap(),
        Some(Version::new(2, 10))
    );
    let absent = MockInterop::new(interpreter());
    assert_eq!(report::version(&absent, "tensorflow").unwrap(), None);
}

#[test]
fn test_format_available_with_home_alias() {
    let interop =
        MockInterop::new(interpreter()).with_module("tensorflow", tensorflow_module("2.3.0"));
    let report = report::report(&interop, "tensorflow").unwrap();
    assert_eq!(
        report::format(&report, Some(Path::new("/home/ada"))),
        "TensorFlow v2.3.0 (~/venv/lib/python3.8/site-packages/tensorflow)\n\
         Python v3.8 (~/venv/bin/python)"
    );
}

#[test]
fn test_json_shape_available() {
    let interop =
        MockInterop::new(interpreter()).with_module("tensorflow", tensorflow_module("2.3.0"));
    let report = report::report(&interop, "tensorflow").unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["available"], true);
    assert_eq!(json["version"], "2.3");
    assert_eq!(json["version_str"], "2.3.0");
    assert_eq!(json["python_version"], "3.8");
    assert_eq!(json["python"], "/home/ada/venv/bin/python");
    assert!(json.get("error_message").is_none());
}

#[test]
fn test_json_shape_unavailable() {
    let interop = MockInterop::new(interpreter());
    let report = report::report(&interop, "tensorflow").unwrap();
    let json: serde_json::Value = serde_json::from_str(&report.to_json().unwrap()).unwrap();

    assert_eq!(json["available"], false);
    assert_eq!(json["python_versions"][0], "/home/ada/venv/bin/python");
    assert!(json["error_message"].as_str().unwrap().contains(INSTALL_HINT));
    assert!(json.get("version").is_none());
}
