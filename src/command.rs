use log::info;

use crate::config::CommandConfig;
use crate::domain::message::Message;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Recognised subject keyword; reserved, does nothing on the network yet.
    Placeholder,
    ActivateSwitch,
}

#[derive(Debug, Clone)]
pub struct CommandPolicy {
    pub placeholder_subject: String,
    pub notification_sender: String,
}

impl From<&CommandConfig> for CommandPolicy {
    fn from(cfg: &CommandConfig) -> Self {
        Self {
            placeholder_subject: cfg.placeholder_subject.clone(),
            notification_sender: cfg.notification_sender.clone(),
        }
    }
}

/// Maps a batch of messages to actions, in message order.
/// Every matching message yields its own action; duplicates are not collapsed.
pub fn interpret(messages: &[Message], policy: &CommandPolicy) -> Vec<Action> {
    let mut actions = Vec::new();
    for msg in messages {
        info!("sender= {} - subject= {}", msg.sender, msg.subject);
        if msg.subject_is(&policy.placeholder_subject) {
            actions.push(Action::Placeholder);
        }
        if msg.sent_by(&policy.notification_sender) {
            actions.push(Action::ActivateSwitch);
        }
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy() -> CommandPolicy {
        CommandPolicy {
            placeholder_subject: "camera".into(),
            notification_sender: "notification@myq.com".into(),
        }
    }

    #[test]
    fn notification_sender_activates_switch() {
        let msgs = [Message::new("Garage door opened", "Notification@MyQ.com")];
        assert_eq!(interpret(&msgs, &policy()), vec![Action::ActivateSwitch]);
    }

    #[test]
    fn unrelated_mail_does_nothing() {
        let msgs = [
            Message::new("Lunch?", "friend@example.com"),
            Message::new("notification@myq.com", "someone@myq.com"),
        ];
        assert!(interpret(&msgs, &policy()).is_empty());
    }

    #[test]
    fn subject_keyword_is_case_insensitive() {
        let msgs = [Message::new("CAMERA", "friend@example.com")];
        assert_eq!(interpret(&msgs, &policy()), vec![Action::Placeholder]);
    }

    #[test]
    fn one_message_can_trigger_both() {
        let msgs = [Message::new("Camera", "notification@myq.com")];
        assert_eq!(
            interpret(&msgs, &policy()),
            vec![Action::Placeholder, Action::ActivateSwitch]
        );
    }

    #[test]
    fn repeated_notifications_are_not_collapsed() {
        let msgs = [
            Message::new("opened", "notification@myq.com"),
            Message::new("closed", "notification@myq.com"),
        ];
        assert_eq!(
            interpret(&msgs, &policy()),
            vec![Action::ActivateSwitch, Action::ActivateSwitch]
        );
    }
}
