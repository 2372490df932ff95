//! Convenience wrappers for common manager actions
//!
//! Each wrapper only assembles the parameter fields and calls
//! [`AmiClient::send_action`]; the response packet is returned untouched.

use crate::{
    command::Action,
    connection::AmiClient,
    error::AmiResult,
    packet::Packet,
};

/// Parameters for [`AmiClient::originate`].
///
/// Either `exten`/`context`/`priority` (dialplan) or `application`/`data`
/// is expected, as the manager documents.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Originate {
    pub channel: String,
    pub exten: Option<String>,
    pub context: Option<String>,
    pub priority: Option<String>,
    pub application: Option<String>,
    pub data: Option<String>,
    /// Ring timeout in milliseconds.
    pub timeout: Option<u32>,
    pub caller_id: Option<String>,
    /// `NAME=value` pairs, sent as a single `Variable` field joined by `|`.
    pub variables: Vec<(String, String)>,
    pub account: Option<String>,
    pub async_: bool,
    pub action_id: Option<String>,
}

impl Originate {
    fn into_action(self) -> AmiResult<Action> {
        let timeout = self
            .timeout
            .map(|t| t.to_string());
        let variables = if self
            .variables
            .is_empty()
        {
            None
        } else {
            Some(
                self.variables
                    .iter()
                    .map(|(k, v)| format!("{}={}", k, v))
                    .collect::<Vec<_>>()
                    .join("|"),
            )
        };

        Action::new("Originate")?
            .field("Channel", &self.channel)?
            .optional_field("Exten", self.exten.as_deref())?
            .optional_field("Context", self.context.as_deref())?
            .optional_field("Priority", self.priority.as_deref())?
            .optional_field("Application", self.application.as_deref())?
            .optional_field("Data", self.data.as_deref())?
            .optional_field("Timeout", timeout.as_deref())?
            .optional_field("CallerID", self.caller_id.as_deref())?
            .optional_field("Variable", variables.as_deref())?
            .optional_field("Account", self.account.as_deref())?
            .optional_field("Async", self.async_.then_some("true"))?
            .optional_field("ActionID", self.action_id.as_deref())
    }
}

impl AmiClient {
    async fn send(&self, action: Action) -> AmiResult<Packet> {
        self.send_action(&action, false)
            .await
    }

    /// Keepalive. Expect `Response: Success` with `Ping: Pong`.
    pub async fn ping(&self) -> AmiResult<Packet> {
        self.send(Action::fixed("Ping"))
            .await
    }

    /// End the manager session. The server replies `Response: Goodbye`.
    pub async fn logoff(&self) -> AmiResult<Packet> {
        self.send(Action::fixed("Logoff"))
            .await
    }

    /// Run a CLI command. Output comes back in the packet's `data` field.
    pub async fn command(&self, command: &str, action_id: Option<&str>) -> AmiResult<Packet> {
        self.send(
            Action::new("Command")?
                .field("Command", command)?
                .optional_field("ActionID", action_id)?,
        )
        .await
    }

    /// Set the event mask: `on`, `off`, or a list such as `system,call,log`.
    pub async fn events(&self, event_mask: &str) -> AmiResult<Packet> {
        self.send(Action::new("Events")?.field("EventMask", event_mask)?)
            .await
    }

    /// Hang up a channel.
    pub async fn hangup(&self, channel: &str) -> AmiResult<Packet> {
        self.send(Action::new("Hangup")?.field("Channel", channel)?)
            .await
    }

    /// Hang up a channel after `timeout` seconds.
    pub async fn absolute_timeout(&self, channel: &str, timeout: u32) -> AmiResult<Packet> {
        self.send(
            Action::new("AbsoluteTimeout")?
                .field("Channel", channel)?
                .field("Timeout", &timeout.to_string())?,
        )
        .await
    }

    /// Read a channel variable, or a global one when `channel` is `None`.
    pub async fn get_var(
        &self,
        channel: Option<&str>,
        variable: &str,
        action_id: Option<&str>,
    ) -> AmiResult<Packet> {
        self.send(
            Action::new("GetVar")?
                .optional_field("Channel", channel)?
                .field("Variable", variable)?
                .optional_field("ActionID", action_id)?,
        )
        .await
    }

    /// Set a channel variable, or a global one when `channel` is `None`.
    pub async fn set_var(&self, channel: Option<&str>, variable: &str, value: &str) -> AmiResult<Packet> {
        self.send(
            Action::new("SetVar")?
                .optional_field("Channel", channel)?
                .field("Variable", variable)?
                .field("Value", value)?,
        )
        .await
    }

    /// Channel status; the details arrive as `Status` events before the response.
    pub async fn status(&self, channel: Option<&str>, action_id: Option<&str>) -> AmiResult<Packet> {
        self.send(
            Action::new("Status")?
                .optional_field("Channel", channel)?
                .optional_field("ActionID", action_id)?,
        )
        .await
    }

    /// State of a dialplan extension.
    pub async fn extension_state(
        &self,
        exten: &str,
        context: &str,
        action_id: Option<&str>,
    ) -> AmiResult<Packet> {
        self.send(
            Action::new("ExtensionState")?
                .field("Exten", exten)?
                .field("Context", context)?
                .optional_field("ActionID", action_id)?,
        )
        .await
    }

    /// Place an outbound call.
    pub async fn originate(&self, originate: Originate) -> AmiResult<Packet> {
        self.send(originate.into_action()?)
            .await
    }

    /// Transfer a channel (and optionally a second one) to a dialplan location.
    pub async fn redirect(
        &self,
        channel: &str,
        extra_channel: Option<&str>,
        exten: &str,
        context: &str,
        priority: &str,
    ) -> AmiResult<Packet> {
        self.send(
            Action::new("Redirect")?
                .field("Channel", channel)?
                .optional_field("ExtraChannel", extra_channel)?
                .field("Exten", exten)?
                .field("Context", context)?
                .field("Priority", priority)?,
        )
        .await
    }

    /// Add an interface to a queue.
    pub async fn queue_add(&self, queue: &str, interface: &str, penalty: u32) -> AmiResult<Packet> {
        let penalty = (penalty > 0).then(|| penalty.to_string());
        self.send(
            Action::new("QueueAdd")?
                .field("Queue", queue)?
                .field("Interface", interface)?
                .optional_field("Penalty", penalty.as_deref())?,
        )
        .await
    }

    /// Remove an interface from a queue.
    pub async fn queue_remove(&self, queue: &str, interface: &str) -> AmiResult<Packet> {
        self.send(
            Action::new("QueueRemove")?
                .field("Queue", queue)?
                .field("Interface", interface)?,
        )
        .await
    }

    /// Summary of every queue with its members and callers.
    pub async fn queues(&self) -> AmiResult<Packet> {
        self.send(Action::fixed("Queues"))
            .await
    }

    /// Queue statistics; members and callers arrive as events.
    pub async fn queue_status(&self, action_id: Option<&str>) -> AmiResult<Packet> {
        self.send(Action::new("QueueStatus")?.optional_field("ActionID", action_id)?)
            .await
    }

    /// Number of new and old messages in a mailbox.
    pub async fn mailbox_count(&self, mailbox: &str, action_id: Option<&str>) -> AmiResult<Packet> {
        self.send(
            Action::new("MailboxCount")?
                .field("Mailbox", mailbox)?
                .optional_field("ActionID", action_id)?,
        )
        .await
    }

    /// Whether a mailbox has waiting messages.
    pub async fn mailbox_status(&self, mailbox: &str, action_id: Option<&str>) -> AmiResult<Packet> {
        self.send(
            Action::new("MailboxStatus")?
                .field("Mailbox", mailbox)?
                .optional_field("ActionID", action_id)?,
        )
        .await
    }

    /// IAX2 peers; each arrives as a `PeerEntry` event.
    pub async fn iax_peers(&self) -> AmiResult<Packet> {
        self.send(Action::fixed("IAXPeers"))
            .await
    }

    /// List the actions the manager accepts.
    pub async fn list_commands(&self, action_id: Option<&str>) -> AmiResult<Packet> {
        self.send(Action::new("ListCommands")?.optional_field("ActionID", action_id)?)
            .await
    }

    /// Parked calls; each arrives as a `ParkedCall` event.
    pub async fn parked_calls(&self, action_id: Option<&str>) -> AmiResult<Packet> {
        self.send(Action::new("ParkedCalls")?.optional_field("ActionID", action_id)?)
            .await
    }

    /// Start recording a channel.
    pub async fn monitor(
        &self,
        channel: &str,
        file: Option<&str>,
        format: Option<&str>,
        mix: bool,
    ) -> AmiResult<Packet> {
        self.send(
            Action::new("Monitor")?
                .field("Channel", channel)?
                .optional_field("File", file)?
                .optional_field("Format", format)?
                .optional_field("Mix", mix.then_some("true"))?,
        )
        .await
    }

    /// Stop recording a channel.
    pub async fn stop_monitor(&self, channel: &str) -> AmiResult<Packet> {
        self.send(Action::new("StopMonitor")?.field("Channel", channel)?)
            .await
    }

    /// Rename the recording of a monitored channel.
    pub async fn change_monitor(&self, channel: &str, file: &str) -> AmiResult<Packet> {
        self.send(
            Action::new("ChangeMonitor")?
                .field("Channel", channel)?
                .field("File", file)?,
        )
        .await
    }

    /// Set the CDR user field of a channel.
    pub async fn set_cdr_user_field(
        &self,
        user_field: &str,
        channel: &str,
        append: bool,
    ) -> AmiResult<Packet> {
        self.send(
            Action::new("SetCDRUserField")?
                .field("UserField", user_field)?
                .field("Channel", channel)?
                .optional_field("Append", append.then_some("true"))?,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn originate_dialplan_fields() {
        let action = Originate {
            channel: "SIP/100".into(),
            exten: Some("200".into()),
            context: Some("default".into()),
            priority: Some("1".into()),
            timeout: Some(30000),
            caller_id: Some("\"Front Desk\" <100>".into()),
            variables: vec![("A".into(), "1".into()), ("B".into(), "2".into())],
            async_: true,
            ..Default::default()
        }
        .into_action()
        .unwrap();

        assert_eq!(
            action.to_wire_format(),
            "Action: Originate\r\n\
             Channel: SIP/100\r\n\
             Exten: 200\r\n\
             Context: default\r\n\
             Priority: 1\r\n\
             Timeout: 30000\r\n\
             CallerID: \"Front Desk\" <100>\r\n\
             Variable: A=1|B=2\r\n\
             Async: true\r\n\
             \r\n"
        );
    }

    #[test]
    fn originate_application_fields() {
        let action = Originate {
            channel: "Local/100@default".into(),
            application: Some("Playback".into()),
            data: Some("hello-world".into()),
            ..Default::default()
        }
        .into_action()
        .unwrap();

        let names: Vec<&str> = action
            .fields()
            .iter()
            .map(|(k, _)| k.as_str())
            .collect();
        assert_eq!(names, vec!["Channel", "Application", "Data"]);
    }

    #[test]
    fn originate_rejects_injected_channel() {
        let result = Originate {
            channel: "SIP/100\r\nAction: Logoff".into(),
            ..Default::default()
        }
        .into_action();
        assert!(result.is_err());
    }
}
