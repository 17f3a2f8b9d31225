//! Commands every node understands

use super::{
    ArgType, Argument, Command, CommandDescription, CommandRegistry, DeviceAction, RegistryError,
    Reply,
};
use std::time::Duration;

/// Register all builtin commands
pub fn register_all(
    registry: &mut CommandRegistry,
    reboot_delay: Duration,
) -> Result<(), RegistryError> {
    registry.register(Box::new(HelloCommand))?;
    registry.register(Box::new(HelloAddCommand))?;
    registry.register(Box::new(HelloEchoCommand))?;
    registry.register(Box::new(ResetCommand::new(reboot_delay)))?;
    Ok(())
}

fn describe(name: &str, params: &[ArgType]) -> CommandDescription {
    CommandDescription {
        name: name.to_string(),
        params: params.to_vec(),
    }
}

/// `hello` -> `world`
pub struct HelloCommand;

impl Command for HelloCommand {
    fn describe(&self) -> CommandDescription {
        describe("hello", &[])
    }

    fn execute(&self, _args: &[Argument]) -> Reply {
        Reply::text("world")
    }
}

/// `helloadd <a> <b>` -> `The Answer is: <a+b>`, wrapping on overflow
pub struct HelloAddCommand;

impl Command for HelloAddCommand {
    fn describe(&self) -> CommandDescription {
        describe("helloadd", &[ArgType::UInt, ArgType::UInt])
    }

    fn execute(&self, args: &[Argument]) -> Reply {
        let a = args.first().and_then(Argument::as_u64).unwrap_or_default();
        let b = args.get(1).and_then(Argument::as_u64).unwrap_or_default();
        Reply::text(format!("The Answer is: {}", a.wrapping_add(b)))
    }
}

/// `helloecho <text>` -> `<text>`
pub struct HelloEchoCommand;

impl Command for HelloEchoCommand {
    fn describe(&self) -> CommandDescription {
        describe("helloecho", &[ArgType::Str])
    }

    fn execute(&self, args: &[Argument]) -> Reply {
        Reply::text(args.first().and_then(Argument::as_str).unwrap_or_default())
    }
}

/// `reset` schedules a restart after the configured delay
pub struct ResetCommand {
    delay: Duration,
}

impl ResetCommand {
    pub fn new(delay: Duration) -> Self {
        Self { delay }
    }

    fn announcement(delay: Duration) -> String {
        if delay.subsec_millis() == 0 {
            format!("Rebooting in {} seconds ... [please standby]", delay.as_secs())
        } else {
            let secs = delay.as_secs_f64();
            format!("Rebooting in {secs:.1} seconds ... [please standby]")
        }
    }
}

impl Command for ResetCommand {
    fn describe(&self) -> CommandDescription {
        describe("reset", &[])
    }

    fn execute(&self, _args: &[Argument]) -> Reply {
        Reply::with_action(Self::announcement(self.delay), DeviceAction::Reboot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hello_add_wraps() {
        let reply = HelloAddCommand.execute(&[Argument::UInt(u64::MAX), Argument::UInt(2)]);
        assert_eq!(reply.text, "The Answer is: 1");
    }

    #[test]
    fn test_hello_echo_keeps_spaces() {
        let reply = HelloEchoCommand.execute(&[Argument::Str("two words".to_string())]);
        assert_eq!(reply.text, "two words");
    }

    #[test]
    fn test_reset_announcement_follows_delay() {
        let reply = ResetCommand::new(Duration::from_secs(10)).execute(&[]);
        assert_eq!(reply.text, "Rebooting in 10 seconds ... [please standby]");
        assert_eq!(reply.action, Some(DeviceAction::Reboot));

        let reply = ResetCommand::new(Duration::from_millis(2500)).execute(&[]);
        assert_eq!(reply.text, "Rebooting in 2.5 seconds ... [please standby]");
    }

    #[test]
    fn test_descriptions() {
        assert!(HelloCommand.describe().params.is_empty());
        assert_eq!(
            HelloAddCommand.describe().params,
            vec![ArgType::UInt, ArgType::UInt]
        );
        assert_eq!(ResetCommand::new(Duration::ZERO).describe().name, "reset");
    }
}
