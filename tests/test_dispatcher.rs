//! Command dispatcher behavior through the public API

use nodeagent::commands::{
    normalize_payload, ArgType, Argument, Command, CommandDescription, CommandRegistry,
    DeviceAction, Reply, MAX_RESPONSE_SIZE,
};
use proptest::prelude::*;
use std::time::Duration;

fn registry() -> CommandRegistry {
    CommandRegistry::with_builtins(Duration::from_secs(5)).unwrap()
}

/// `scale <factor> <offset> <label>` exercising every numeric type
struct ScaleCommand;

impl Command for ScaleCommand {
    fn describe(&self) -> CommandDescription {
        CommandDescription {
            name: "scale".to_string(),
            params: vec![ArgType::Float, ArgType::Int, ArgType::Str],
        }
    }

    fn execute(&self, args: &[Argument]) -> Reply {
        let factor = args[0].as_f64().unwrap_or_default();
        let offset = args[1].as_i64().unwrap_or_default();
        let label = args[2].as_str().unwrap_or_default();
        Reply::text(format!("{label}={}", factor * 10.0 + offset as f64))
    }
}

#[test]
fn test_dispatch_examples() {
    let registry = registry();
    assert_eq!(registry.dispatch("helloadd 2 3").text, "The Answer is: 5");
    assert_eq!(registry.dispatch("helloecho foo").text, "foo");
    assert_eq!(registry.dispatch("hello").text, "world");
    assert_eq!(
        registry.dispatch("nosuchcommand").text,
        "parse error: unknown command"
    );
    assert_eq!(
        registry.dispatch("helloadd 2").text,
        "parse error: missing argument"
    );
}

#[test]
fn test_payload_is_lowercased_before_dispatch() {
    let registry = registry();
    let text = normalize_payload(b"HELLOADD 40 2\0trailing junk");
    assert_eq!(registry.dispatch(&text).text, "The Answer is: 42");
}

#[test]
fn test_custom_command_with_mixed_types() {
    let mut registry = registry();
    registry.register(Box::new(ScaleCommand)).unwrap();

    assert_eq!(registry.dispatch("scale 1.5 -3 out").text, "out=12");
    assert_eq!(
        registry.dispatch("scale x -3 out").text,
        "parse error: invalid argument"
    );
    assert_eq!(
        registry.dispatch("scale 1.5 2.5 out").text,
        "parse error: invalid argument"
    );
}

#[test]
fn test_negative_unsigned_is_invalid() {
    assert_eq!(
        registry().dispatch("helloadd -1 2").text,
        "parse error: invalid argument"
    );
}

#[test]
fn test_long_echo_is_truncated() {
    let long = "a".repeat(100);
    let reply = registry().dispatch(&format!("helloecho {long}"));
    assert_eq!(reply.text.len(), MAX_RESPONSE_SIZE);
}

#[test]
fn test_only_reset_requests_reboot() {
    let registry = registry();
    for line in ["hello", "helloadd 1 1", "helloecho reset", "resets"] {
        assert_eq!(registry.dispatch(line).action, None, "line: {line}");
    }
    assert_eq!(registry.dispatch("reset").action, Some(DeviceAction::Reboot));
}

proptest! {
    #[test]
    fn arbitrary_bytes_always_get_a_bounded_reply(bytes in prop::collection::vec(any::<u8>(), 0..256)) {
        let text = normalize_payload(&bytes);
        let reply = registry().dispatch(&text);
        prop_assert!(reply.text.len() <= MAX_RESPONSE_SIZE);
    }

    #[test]
    fn echo_returns_plain_words(word in "[a-z0-9]{1,40}") {
        let reply = registry().dispatch(&format!("helloecho {word}"));
        prop_assert_eq!(reply.text, word);
    }
}
