//! Typed command surface.
//!
//! Each panel operation is a [`Command`] variant whose constructor validates
//! the caller's arguments. A constructed command is always well formed and
//! turns into an [`ActionRequest`] for the correlator without further checks.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::error::{CpcError, Result};
use crate::interactions::{is_uid, InteractionId};
use crate::protocol::ActionRequest;
use crate::session::ActiveInteraction;

macro_rules! string_enum {
    ($(#[$meta:meta])* $name:ident, $field:literal { $($variant:ident => $wire:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub const ALL: &'static [$name] = &[$($name::$variant),+];

            pub fn as_str(&self) -> &'static str {
                match self {
                    $($name::$variant => $wire),+
                }
            }
        }

        impl FromStr for $name {
            type Err = CpcError;

            fn from_str(s: &str) -> Result<Self> {
                match s {
                    $($wire => Ok($name::$variant),)+
                    _ => Err(CpcError::validation(
                        $field,
                        format!(
                            "Invalid parameter value. Possible values are: {}",
                            [$($wire),+].join("|")
                        ),
                    )),
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }
    };
}

string_enum!(
    /// State change applied to an ongoing phone call.
    CallStateAction, "action" {
        StartRecording => "startRecording",
        StopRecording => "stopRecording",
        Hold => "hold",
        Unhold => "unhold",
        Mute => "mute",
        Unmute => "unmute",
    }
);

string_enum!(
    /// Lifecycle action on an interaction.
    InteractionAction, "action" {
        Reject => "reject",
        Accept => "accept",
        Hangup => "hangup",
        Handle => "handle",
        Pick => "pick",
    }
);

/// A single DTMF tone: `0`-`9`, `A`-`D`, `*` or `#`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DtmfTone(char);

impl DtmfTone {
    pub fn as_char(&self) -> char {
        self.0
    }
}

impl FromStr for DtmfTone {
    type Err = CpcError;

    fn from_str(s: &str) -> Result<Self> {
        let mut chars = s.chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) if c.is_ascii_digit() || matches!(c, 'A'..='D' | '*' | '#') => {
                Ok(DtmfTone(c))
            }
            _ => Err(CpcError::validation("tone", "Must provide a valid [tone]")),
        }
    }
}

/// Subject of a `getDetails` request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DetailSubject {
    User,
    Interaction,
    Interactions,
    Queue,
    Queues,
    Transcript,
    ActiveExtension,
    ActiveInteraction,
    /// Details of one interaction by id.
    Id(InteractionId),
}

impl DetailSubject {
    pub fn as_str(&self) -> &str {
        match self {
            DetailSubject::User => "user",
            DetailSubject::Interaction => "interaction",
            DetailSubject::Interactions => "interactions",
            DetailSubject::Queue => "queue",
            DetailSubject::Queues => "queues",
            DetailSubject::Transcript => "transcript",
            DetailSubject::ActiveExtension => "activeExtension",
            DetailSubject::ActiveInteraction => "activeInteraction",
            DetailSubject::Id(id) => id.as_str(),
        }
    }

    pub fn request(&self) -> ActionRequest {
        ActionRequest::new("getDetails", "detail").with_value(json!(self.as_str()))
    }
}

impl FromStr for DetailSubject {
    type Err = CpcError;

    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "user" => DetailSubject::User,
            "interaction" => DetailSubject::Interaction,
            "interactions" => DetailSubject::Interactions,
            "queue" => DetailSubject::Queue,
            "queues" => DetailSubject::Queues,
            "transcript" => DetailSubject::Transcript,
            "activeExtension" => DetailSubject::ActiveExtension,
            "activeInteraction" => DetailSubject::ActiveInteraction,
            other if is_uid(other) => DetailSubject::Id(InteractionId::parse(other)?),
            _ => {
                return Err(CpcError::validation(
                    "subject",
                    "Invalid parameter value. Possible values are: user|interaction|interactions|queue|queues|transcript|activeExtension|activeInteraction|<interaction_id>",
                ))
            }
        })
    }
}

/// Outbound email.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EmailRequest {
    pub to: Vec<String>,
    /// Send without user interaction; requires subject and content.
    #[serde(default)]
    pub direct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Outbound SMS chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SmsRequest {
    pub to: String,
    /// Start and send the first message without user interaction; requires from and content.
    #[serde(default)]
    pub direct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Outbound WhatsApp chat.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhatsAppRequest {
    pub to: String,
    #[serde(default)]
    pub direct: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// Template sent when no consent is stored for the destination yet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default_reply_template_id: Option<String>,
}

/// A validated panel command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    CallOut {
        to: String,
        from: Option<String>,
    },
    CallState {
        action: CallStateAction,
        interaction_id: InteractionId,
    },
    Consult {
        to: String,
        interaction_id: InteractionId,
    },
    Dtmf {
        tone: DtmfTone,
        interaction_id: Option<String>,
    },
    GetDetails(DetailSubject),
    Interaction {
        action: InteractionAction,
        interaction_id: InteractionId,
    },
    JoinCalls {
        interaction_id: InteractionId,
    },
    Message {
        content: String,
        interaction_id: Option<String>,
    },
    SendEmail(EmailRequest),
    SendSms(SmsRequest),
    StartWhatsAppChat(WhatsAppRequest),
    Transfer {
        to: String,
        interaction_id: Option<String>,
    },
}

fn required(field: &str, value: &str) -> Result<String> {
    if value.trim().is_empty() {
        Err(CpcError::validation(
            field,
            format!("Must provide a valid [{}]", field),
        ))
    } else {
        Ok(value.to_string())
    }
}

fn optional_id(interaction_id: Option<&str>) -> Result<Option<String>> {
    match interaction_id {
        Some(id) if id.is_empty() => Err(CpcError::validation(
            "interactionId",
            "Must provide a valid [interactionId]",
        )),
        other => Ok(other.map(str::to_string)),
    }
}

/// Explicit interaction id, else the active one.
fn resolve_interaction(
    cpc_fn: &str,
    interaction_id: Option<&str>,
    active: &ActiveInteraction,
) -> Result<InteractionId> {
    match (interaction_id, active.id()) {
        (Some(id), _) => InteractionId::parse(id),
        (None, Some(active)) => InteractionId::parse(active),
        (None, None) => Err(CpcError::NoActiveInteraction(format!(
            "{}: interactionId not provided, and no active/in-view interaction",
            cpc_fn
        ))),
    }
}

fn require_when_direct(direct: bool, field: &str, value: &Option<String>) -> Result<()> {
    let present = value.as_deref().map(|v| !v.is_empty()).unwrap_or(false);
    if direct && !present {
        Err(CpcError::validation(
            field,
            format!("Parameter [{}] must have value when parameter [direct] is true", field),
        ))
    } else {
        Ok(())
    }
}

impl Command {
    pub fn call_out(to: &str, from: Option<&str>) -> Result<Self> {
        Ok(Command::CallOut {
            to: required("destinationNumber", to)?,
            from: from.map(str::to_string),
        })
    }

    pub fn call_state(
        action: &str,
        interaction_id: Option<&str>,
        active: &ActiveInteraction,
    ) -> Result<Self> {
        Ok(Command::CallState {
            action: action.parse()?,
            interaction_id: resolve_interaction("callState", interaction_id, active)?,
        })
    }

    pub fn consult(
        to: &str,
        interaction_id: Option<&str>,
        active: &ActiveInteraction,
    ) -> Result<Self> {
        Ok(Command::Consult {
            to: required("to", to)?,
            interaction_id: resolve_interaction("consult", interaction_id, active)?,
        })
    }

    pub fn dtmf(tone: &str, interaction_id: Option<&str>) -> Result<Self> {
        Ok(Command::Dtmf {
            tone: tone.parse()?,
            interaction_id: optional_id(interaction_id)?,
        })
    }

    pub fn get_details(subject: &str) -> Result<Self> {
        Ok(Command::GetDetails(subject.parse()?))
    }

    pub fn interaction(
        action: &str,
        interaction_id: Option<&str>,
        active: &ActiveInteraction,
    ) -> Result<Self> {
        Ok(Command::Interaction {
            action: action.parse()?,
            interaction_id: resolve_interaction("interaction", interaction_id, active)?,
        })
    }

    pub fn join_calls(active: &ActiveInteraction) -> Result<Self> {
        Ok(Command::JoinCalls {
            interaction_id: resolve_interaction("joinCalls", None, active)?,
        })
    }

    pub fn message(content: &str, interaction_id: Option<&str>) -> Result<Self> {
        if content.is_empty() {
            return Err(CpcError::validation("message", "Must provide a valid [message]"));
        }
        Ok(Command::Message {
            content: content.to_string(),
            interaction_id: optional_id(interaction_id)?,
        })
    }

    pub fn send_email(email: EmailRequest) -> Result<Self> {
        if email.to.is_empty() || email.to.iter().any(|a| a.trim().is_empty()) {
            return Err(CpcError::validation(
                "to",
                "Parameter [to] must contain destination email addresses",
            ));
        }
        require_when_direct(email.direct, "subject", &email.subject)?;
        require_when_direct(email.direct, "content", &email.content)?;
        Ok(Command::SendEmail(email))
    }

    pub fn send_sms(sms: SmsRequest) -> Result<Self> {
        required("to", &sms.to)?;
        require_when_direct(sms.direct, "from", &sms.from)?;
        require_when_direct(sms.direct, "content", &sms.content)?;
        Ok(Command::SendSms(sms))
    }

    pub fn start_whatsapp_chat(chat: WhatsAppRequest) -> Result<Self> {
        required("to", &chat.to)?;
        require_when_direct(chat.direct, "from", &chat.from)?;
        require_when_direct(chat.direct, "content", &chat.content)?;
        if let Some(template) = &chat.default_reply_template_id {
            if !is_uid(template) {
                return Err(CpcError::validation(
                    "defaultReplyTemplateId",
                    "Must provide a string UID value for parameter [defaultReplyTemplateId]",
                ));
            }
        }
        Ok(Command::StartWhatsAppChat(chat))
    }

    pub fn transfer(to: &str, interaction_id: Option<&str>) -> Result<Self> {
        Ok(Command::Transfer {
            to: required("to", to)?,
            interaction_id: optional_id(interaction_id)?,
        })
    }

    /// Name of the public operation; prefixes the action id.
    pub fn cpc_fn(&self) -> &'static str {
        match self {
            Command::CallOut { .. } => "callOut",
            Command::CallState { .. } => "callState",
            Command::Consult { .. } => "consult",
            Command::Dtmf { .. } => "dtmf",
            Command::GetDetails(_) => "getDetails",
            Command::Interaction { .. } => "interaction",
            Command::JoinCalls { .. } => "joinCalls",
            Command::Message { .. } => "message",
            Command::SendEmail(_) => "sendEmail",
            Command::SendSms(_) => "sendSMS",
            Command::StartWhatsAppChat(_) => "startWhatsAppChat",
            Command::Transfer { .. } => "transfer",
        }
    }

    /// Build the action payload for the correlator.
    pub fn into_request(self) -> Result<ActionRequest> {
        let cpc_fn = self.cpc_fn();
        let request = match self {
            Command::CallOut { to, from } => ActionRequest::new(cpc_fn, "outbound")
                .with_value(json!({"channel": "phone", "to": to, "from": from})),
            Command::CallState {
                action,
                interaction_id,
            } => ActionRequest::new(cpc_fn, "callState")
                .with_interaction(Some(interaction_id.into()))
                .with_value(json!(action.as_str())),
            Command::Consult { to, interaction_id } => ActionRequest::new(cpc_fn, "consult")
                .with_interaction(Some(interaction_id.into()))
                .with_value(json!({ "to": to })),
            Command::Dtmf {
                tone,
                interaction_id,
            } => ActionRequest::new(cpc_fn, "dtmf")
                .with_interaction(interaction_id)
                .with_value(json!({"content": tone.as_char().to_string()})),
            Command::GetDetails(subject) => subject.request(),
            Command::Interaction {
                action,
                interaction_id,
            } => ActionRequest::new(cpc_fn, "interaction")
                .with_interaction(Some(interaction_id.into()))
                .with_value(json!(action.as_str())),
            Command::JoinCalls { interaction_id } => {
                ActionRequest::new(cpc_fn, "join").with_interaction(Some(interaction_id.into()))
            }
            Command::Message {
                content,
                interaction_id,
            } => ActionRequest::new(cpc_fn, "message")
                .with_interaction(interaction_id)
                .with_value(json!({ "content": content })),
            Command::SendEmail(email) => {
                ActionRequest::new(cpc_fn, "outbound").with_value(outbound("email", &email)?)
            }
            Command::SendSms(sms) => {
                ActionRequest::new(cpc_fn, "outbound").with_value(outbound("sms", &sms)?)
            }
            Command::StartWhatsAppChat(chat) => {
                ActionRequest::new(cpc_fn, "outbound").with_value(outbound("whatsapp", &chat)?)
            }
            Command::Transfer { to, interaction_id } => ActionRequest::new(cpc_fn, "transfer")
                .with_interaction(interaction_id)
                .with_value(json!({ "to": to })),
        };
        Ok(request)
    }
}

/// `{channel, ...fields}` value of an outbound command.
fn outbound<T: Serialize>(channel: &str, fields: &T) -> Result<Value> {
    let mut value = serde_json::to_value(fields)?;
    if let Value::Object(map) = &mut value {
        map.insert("channel".to_string(), json!(channel));
    }
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    const ID: &str = "0123456789abcdef0123456789abcdef";

    #[test]
    fn test_call_state_uses_active_interaction() {
        let active = ActiveInteraction::Id(ID.to_string());
        let command = Command::call_state("hold", None, &active).unwrap();
        let request = command.into_request().unwrap();

        assert_eq!(request.cpc_fn, "callState");
        assert_eq!(request.command, "callState");
        assert_eq!(request.interaction_id.as_deref(), Some(ID));
        assert_eq!(request.value, Some(json!("hold")));
    }

    #[test]
    fn test_call_state_rejects_unknown_action() {
        let active = ActiveInteraction::Id(ID.to_string());
        let err = Command::call_state("explode", None, &active).unwrap_err();
        assert!(err.to_string().contains("startRecording|stopRecording"));
    }

    #[test]
    fn test_interaction_requires_id_or_active() {
        for active in [ActiveInteraction::Unset, ActiveInteraction::None] {
            let err = Command::interaction("accept", None, &active).unwrap_err();
            assert!(matches!(err, CpcError::NoActiveInteraction(_)));
        }
        assert!(Command::interaction("accept", Some("short"), &ActiveInteraction::Unset).is_err());
        assert!(Command::interaction("pick", Some(ID), &ActiveInteraction::Unset).is_ok());
    }

    #[test]
    fn test_join_calls_payload() {
        let request = Command::join_calls(&ActiveInteraction::Id(ID.into()))
            .unwrap()
            .into_request()
            .unwrap();
        assert_eq!(request.command, "join");
        assert!(request.value.is_none());
    }

    #[test]
    fn test_dtmf_tones() {
        for tone in ["0", "9", "A", "D", "*", "#"] {
            assert!(Command::dtmf(tone, None).is_ok(), "{} should be valid", tone);
        }
        for tone in ["", "E", "12", "a"] {
            assert!(Command::dtmf(tone, None).is_err(), "{} should be invalid", tone);
        }
        let request = Command::dtmf("#", None).unwrap().into_request().unwrap();
        assert_eq!(request.value, Some(json!({"content": "#"})));
        assert!(request.interaction_id.is_none());
    }

    #[test]
    fn test_get_details_subjects() {
        assert_eq!(
            Command::get_details("queues").unwrap(),
            Command::GetDetails(DetailSubject::Queues)
        );
        assert!(matches!(
            Command::get_details(ID).unwrap(),
            Command::GetDetails(DetailSubject::Id(_))
        ));
        assert!(Command::get_details("everything").is_err());

        let request = DetailSubject::ActiveExtension.request();
        assert_eq!(request.command, "detail");
        assert_eq!(request.value, Some(json!("activeExtension")));
    }

    #[test]
    fn test_call_out_payload() {
        let request = Command::call_out("+358401234567", Some("+35810100"))
            .unwrap()
            .into_request()
            .unwrap();
        assert_eq!(request.command, "outbound");
        assert_eq!(
            request.value,
            Some(json!({"channel": "phone", "to": "+358401234567", "from": "+35810100"}))
        );
        assert!(Command::call_out("", None).is_err());
    }

    #[test]
    fn test_email_direct_requires_subject_and_content() {
        let email = EmailRequest {
            to: vec!["customer@example.com".into()],
            direct: true,
            subject: Some("Hello".into()),
            ..Default::default()
        };
        assert!(Command::send_email(email.clone()).is_err());

        let complete = EmailRequest {
            content: Some("Body".into()),
            ..email
        };
        let request = Command::send_email(complete)
            .unwrap()
            .into_request()
            .unwrap();
        let value = request.value.unwrap();
        assert_eq!(value["channel"], "email");
        assert_eq!(value["to"][0], "customer@example.com");
        assert_eq!(value["direct"], true);
    }

    #[test]
    fn test_email_requires_recipients() {
        assert!(Command::send_email(EmailRequest::default()).is_err());
    }

    #[test]
    fn test_sms_validation() {
        let sms = SmsRequest {
            to: "+358401234567".into(),
            direct: true,
            content: Some("Hi".into()),
            ..Default::default()
        };
        assert!(Command::send_sms(sms.clone()).is_err());

        let request = Command::send_sms(SmsRequest {
            from: Some("+35810100".into()),
            ..sms
        })
        .unwrap()
        .into_request()
        .unwrap();
        assert_eq!(request.cpc_fn, "sendSMS");
        assert_eq!(request.value.unwrap()["channel"], "sms");
    }

    #[test]
    fn test_whatsapp_template_must_be_uid() {
        let chat = WhatsAppRequest {
            to: "+358401234567".into(),
            default_reply_template_id: Some("tmpl".into()),
            ..Default::default()
        };
        assert!(Command::start_whatsapp_chat(chat.clone()).is_err());

        let request = Command::start_whatsapp_chat(WhatsAppRequest {
            default_reply_template_id: Some(ID.into()),
            ..chat
        })
        .unwrap()
        .into_request()
        .unwrap();
        let value = request.value.unwrap();
        assert_eq!(value["channel"], "whatsapp");
        assert_eq!(value["defaultReplyTemplateId"], ID);
    }

    #[test]
    fn test_message_and_transfer() {
        assert!(Command::message("", None).is_err());
        assert!(Command::message("hi", Some("")).is_err());
        let request = Command::message("hi", Some(ID))
            .unwrap()
            .into_request()
            .unwrap();
        assert_eq!(request.value, Some(json!({"content": "hi"})));

        let request = Command::transfer("sales@queue", None)
            .unwrap()
            .into_request()
            .unwrap();
        assert_eq!(request.command, "transfer");
        assert_eq!(request.value, Some(json!({"to": "sales@queue"})));
    }

    #[test]
    fn test_consult_prefers_explicit_id() {
        let other = "f".repeat(32);
        let command =
            Command::consult("2001", Some(&other), &ActiveInteraction::Id(ID.into())).unwrap();
        let request = command.into_request().unwrap();
        assert_eq!(request.interaction_id, Some(other));
        assert!(Command::consult("2001", None, &ActiveInteraction::None).is_err());
    }
}
