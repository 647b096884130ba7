use std::sync::{Mutex, OnceLock};

use log::{Level, LevelFilter, Log, Metadata, Record};
use trellis_core::{evaluate, try_evaluate, value_map, EvalError, Scope, Value};

struct CaptureLogger {
    lines: Mutex<Vec<(Level, String)>>,
}

impl Log for CaptureLogger {
    fn enabled(&self, _metadata: &Metadata) -> bool {
        true
    }

    fn log(&self, record: &Record) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push((record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

fn logger() -> &'static CaptureLogger {
    static LOGGER: OnceLock<&'static CaptureLogger> = OnceLock::new();
    LOGGER.get_or_init(|| {
        let logger: &'static CaptureLogger = Box::leak(Box::new(CaptureLogger {
            lines: Mutex::new(Vec::new()),
        }));
        let _ = log::set_logger(logger);
        log::set_max_level(LevelFilter::Trace);
        logger
    })
}

fn warnings_mentioning(needle: &str) -> usize {
    logger()
        .lines
        .lock()
        .unwrap()
        .iter()
        .filter(|(level, line)| *level == Level::Warn && line.contains(needle))
        .count()
}

#[test]
fn member_of_undefined_degrades_with_a_diagnostic() {
    logger();
    let scope = Scope::new();
    assert_eq!(evaluate("foo.bar.baz", &scope), Value::Undefined);
    assert_eq!(warnings_mentioning("foo.bar.baz"), 1);
    assert!(matches!(
        try_evaluate("foo.bar.baz", &scope),
        Err(EvalError::PropertyOfNothing { .. })
    ));
}

#[test]
fn syntax_errors_degrade_too() {
    logger();
    let scope = Scope::new();
    assert_eq!(evaluate("count +* 2", &scope), Value::Undefined);
    assert_eq!(warnings_mentioning("count +* 2"), 1);
}

#[test]
fn missing_identifier_is_quietly_undefined() {
    logger();
    assert_eq!(evaluate("nothingHere", &Scope::new()), Value::Undefined);
    assert_eq!(warnings_mentioning("nothingHere"), 0);
}

#[test]
fn module_entries_shadow_state_keys() {
    let state = value_map! { "cart" => "state wins?", "count" => 2 };
    let modules = value_map! { "cart" => value_map! { "items" => 7 } };
    let scope = Scope::merged(&state, &modules);
    assert_eq!(evaluate("cart.items", &scope), Value::from(7));
    assert_eq!(evaluate("count * cart.items", &scope), Value::from(14));
}

#[test]
fn template_style_expressions() {
    let state = value_map! {
        "user" => value_map! { "name" => "ada", "tags" => vec!["x", "y"] },
        "count" => 3,
    };
    let scope = Scope::merged(&state, &value_map! {});
    assert_eq!(
        evaluate("user.name.toUpperCase() + '!'", &scope),
        Value::from("ADA!")
    );
    assert_eq!(evaluate("user.tags.join('/')", &scope), Value::from("x/y"));
    assert_eq!(
        evaluate("count > 2 ? 'many' : 'few'", &scope),
        Value::from("many")
    );
    assert_eq!(evaluate("user?.address?.city ?? 'n/a'", &scope), Value::from("n/a"));
}
