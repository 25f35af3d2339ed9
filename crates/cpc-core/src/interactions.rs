//! Reconciliation cache of ongoing interactions.
//!
//! The panel reports interaction lifecycle changes as partial `status`
//! events. The cache folds each event into one accumulated [`Interaction`]
//! per id, stamps the lifecycle timestamp the status names and evicts the
//! interaction once it has been handled.

use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{CpcError, Result};

/// Length of interaction, template and profile ids.
pub const UID_LENGTH: usize = 32;

/// A 32-character interaction id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InteractionId(String);

impl InteractionId {
    pub fn parse(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        if is_uid(&id) {
            Ok(Self(id))
        } else {
            Err(CpcError::validation(
                "interactionId",
                "Must provide a valid [interactionId]",
            ))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InteractionId {
    type Error = CpcError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(value)
    }
}

impl From<InteractionId> for String {
    fn from(id: InteractionId) -> Self {
        id.0
    }
}

impl fmt::Display for InteractionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Whether `value` looks like a panel uid.
pub fn is_uid(value: &str) -> bool {
    value.chars().count() == UID_LENGTH
}

/// Channel an interaction runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelType {
    Phone,
    Chat,
    Email,
    Sms,
    Whatsapp,
}

impl ChannelType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelType::Phone => "phone",
            ChannelType::Chat => "chat",
            ChannelType::Email => "email",
            ChannelType::Sms => "sms",
            ChannelType::Whatsapp => "whatsapp",
        }
    }
}

impl FromStr for ChannelType {
    type Err = CpcError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "phone" => Ok(ChannelType::Phone),
            "chat" => Ok(ChannelType::Chat),
            "email" => Ok(ChannelType::Email),
            "sms" => Ok(ChannelType::Sms),
            "whatsapp" => Ok(ChannelType::Whatsapp),
            other => Err(CpcError::validation(
                "channelType",
                format!(
                    "Invalid parameter value [{}]. Possible values are: phone|chat|email|sms|whatsapp",
                    other
                ),
            )),
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle status carried by a `status` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InteractionStatus {
    Incoming,
    Outgoing,
    Accepted,
    Rejected,
    Ended,
    Handled,
}

impl InteractionStatus {
    /// Parse a status value; values without a lifecycle timestamp yield `None`.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "incoming" => Some(Self::Incoming),
            "outgoing" => Some(Self::Outgoing),
            "accepted" => Some(Self::Accepted),
            "rejected" => Some(Self::Rejected),
            "ended" => Some(Self::Ended),
            "handled" => Some(Self::Handled),
            _ => None,
        }
    }

    /// Name of the timestamp field this status stamps.
    pub fn timestamp_field(&self) -> &'static str {
        match self {
            Self::Incoming => "date_incoming",
            Self::Outgoing => "date_outgoing",
            Self::Accepted => "date_accepted",
            Self::Rejected => "date_rejected",
            Self::Ended => "date_ended",
            Self::Handled => "date_handled",
        }
    }
}

/// One lifecycle timestamp.
///
/// Stamps taken locally are UTC instants. Values the panel supplies that are
/// not RFC 3339 are kept exactly as sent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Timestamp {
    At(DateTime<Utc>),
    Raw(Value),
}

impl Timestamp {
    /// Interpret a peer-supplied field value; `null` clears the slot.
    fn from_peer(value: Value) -> Option<Self> {
        if value.is_null() {
            return None;
        }
        let parsed = value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc));
        Some(match parsed {
            Some(at) => Timestamp::At(at),
            None => Timestamp::Raw(value),
        })
    }

    pub fn instant(&self) -> Option<DateTime<Utc>> {
        match self {
            Timestamp::At(at) => Some(*at),
            Timestamp::Raw(_) => None,
        }
    }
}

/// Lifecycle timestamps; each stays `None` until its status arrives.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LifecycleTimestamps {
    pub date_incoming: Option<Timestamp>,
    pub date_outgoing: Option<Timestamp>,
    pub date_accepted: Option<Timestamp>,
    pub date_rejected: Option<Timestamp>,
    pub date_ended: Option<Timestamp>,
    pub date_handled: Option<Timestamp>,
}

impl LifecycleTimestamps {
    fn slot(&mut self, status: InteractionStatus) -> &mut Option<Timestamp> {
        match status {
            InteractionStatus::Incoming => &mut self.date_incoming,
            InteractionStatus::Outgoing => &mut self.date_outgoing,
            InteractionStatus::Accepted => &mut self.date_accepted,
            InteractionStatus::Rejected => &mut self.date_rejected,
            InteractionStatus::Ended => &mut self.date_ended,
            InteractionStatus::Handled => &mut self.date_handled,
        }
    }

    pub fn stamp(&mut self, status: InteractionStatus, at: DateTime<Utc>) {
        *self.slot(status) = Some(Timestamp::At(at));
    }

    /// The slot for `status`, as sent or stamped.
    pub fn raw(&self, status: InteractionStatus) -> Option<&Timestamp> {
        match status {
            InteractionStatus::Incoming => self.date_incoming.as_ref(),
            InteractionStatus::Outgoing => self.date_outgoing.as_ref(),
            InteractionStatus::Accepted => self.date_accepted.as_ref(),
            InteractionStatus::Rejected => self.date_rejected.as_ref(),
            InteractionStatus::Ended => self.date_ended.as_ref(),
            InteractionStatus::Handled => self.date_handled.as_ref(),
        }
    }

    /// The slot for `status` when it holds an instant.
    pub fn get(&self, status: InteractionStatus) -> Option<DateTime<Utc>> {
        self.raw(status).and_then(Timestamp::instant)
    }
}

/// Accumulated state of one interaction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Interaction {
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_type: Option<ChannelType>,
    #[serde(flatten)]
    pub timestamps: LifecycleTimestamps,
    /// Every other field the panel supplied.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Interaction {
    fn seed(id: String) -> Self {
        Self {
            id,
            channel_type: None,
            timestamps: LifecycleTimestamps::default(),
            extra: Map::new(),
        }
    }

    /// Shallow-merge incoming fields over this interaction; incoming wins.
    fn absorb(&mut self, fields: Map<String, Value>) {
        for (key, value) in fields {
            match key.as_str() {
                "id" => {}
                "channel_type" => match value.as_str().map(ChannelType::from_str) {
                    Some(Ok(channel)) => {
                        self.channel_type = Some(channel);
                        self.extra.remove("channel_type");
                    }
                    _ => {
                        self.channel_type = None;
                        self.extra.insert(key, value);
                    }
                },
                field => match timestamp_status(field) {
                    Some(status) => {
                        *self.timestamps.slot(status) = Timestamp::from_peer(value);
                    }
                    None => {
                        self.extra.insert(key, value);
                    }
                },
            }
        }
    }

    pub fn to_value(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

fn timestamp_status(field: &str) -> Option<InteractionStatus> {
    field
        .strip_prefix("date_")
        .and_then(InteractionStatus::parse)
}

/// Result of folding one status event into the cache.
#[derive(Debug, Clone, PartialEq)]
pub struct MergeOutcome {
    /// The merged interaction, delivered once even when it was evicted.
    pub interaction: Interaction,
    pub was_cached: bool,
    pub evicted: bool,
    /// Number of live interactions after the merge.
    pub remaining: usize,
}

/// Interaction id → accumulated interaction.
#[derive(Debug, Default)]
pub struct InteractionCache {
    entries: HashMap<String, Interaction>,
}

impl InteractionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold a status event into the cache, stamping `status` with the current time.
    pub fn merge(
        &mut self,
        status: Option<InteractionStatus>,
        payload: Map<String, Value>,
    ) -> Result<MergeOutcome> {
        self.merge_at(status, payload, Utc::now())
    }

    /// [`merge`](Self::merge) with an explicit stamp time.
    pub fn merge_at(
        &mut self,
        status: Option<InteractionStatus>,
        payload: Map<String, Value>,
        now: DateTime<Utc>,
    ) -> Result<MergeOutcome> {
        let id = payload
            .get("id")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| CpcError::validation("interaction.id", "Status event without id"))?;

        let (mut interaction, was_cached) = match self.entries.remove(&id) {
            Some(cached) => {
                debug!("Interaction [{}] found in cache", id);
                (cached, true)
            }
            None => {
                debug!("Interaction [{}] added to cache", id);
                (Interaction::seed(id.clone()), false)
            }
        };
        interaction.absorb(payload);

        if let Some(status) = status {
            interaction.timestamps.stamp(status, now);
        }

        let evicted = status == Some(InteractionStatus::Handled);
        if evicted {
            debug!("Handled interaction [{}] cleared from cache", id);
        } else {
            self.entries.insert(id.clone(), interaction.clone());
            debug!("Interaction [{}] updated in cache", id);
        }
        debug!(
            "Communication Panel ongoing conversations: [{}]",
            self.entries.len()
        );

        Ok(MergeOutcome {
            interaction,
            was_cached,
            evicted,
            remaining: self.entries.len(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Interaction> {
        self.entries.get(id)
    }

    /// Whether any interaction is ongoing, optionally only on one channel.
    pub fn has_any(&self, channel: Option<ChannelType>) -> bool {
        match channel {
            Some(channel) => self
                .entries
                .values()
                .any(|i| i.channel_type == Some(channel)),
            None => !self.entries.is_empty(),
        }
    }

    /// Copy of every ongoing interaction, ordered by id.
    pub fn snapshot(&self) -> Vec<Interaction> {
        let mut all: Vec<Interaction> = self.entries.values().cloned().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const ID: &str = "11111111111111111111111111111111";

    fn fields(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_incoming_accepted_handled_lifecycle() {
        let mut cache = InteractionCache::new();

        let first = cache
            .merge(
                InteractionStatus::parse("incoming"),
                fields(json!({"id": ID, "channel_type": "phone", "from": "+358401234567"})),
            )
            .unwrap();
        assert!(!first.was_cached);
        assert_eq!(cache.len(), 1);

        cache
            .merge(
                InteractionStatus::parse("accepted"),
                fields(json!({"id": ID, "state": "connected"})),
            )
            .unwrap();

        let cached = cache.get(ID).unwrap();
        assert!(cached.timestamps.date_incoming.is_some());
        assert!(cached.timestamps.date_accepted.is_some());
        assert!(cached.timestamps.date_outgoing.is_none());
        assert!(cached.timestamps.date_rejected.is_none());
        assert!(cached.timestamps.date_ended.is_none());
        assert!(cached.timestamps.date_handled.is_none());
        assert_eq!(cached.channel_type, Some(ChannelType::Phone));
        assert_eq!(cached.extra["from"], "+358401234567");
        assert_eq!(cached.extra["state"], "connected");

        let last = cache
            .merge(InteractionStatus::parse("handled"), fields(json!({"id": ID})))
            .unwrap();
        assert!(last.evicted);
        assert_eq!(last.remaining, 0);
        assert!(last.interaction.timestamps.date_handled.is_some());
        assert!(last.interaction.timestamps.date_incoming.is_some());
        assert!(cache.get(ID).is_none());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_incoming_fields_win() {
        let mut cache = InteractionCache::new();
        cache
            .merge(None, fields(json!({"id": ID, "subject": "old", "queue": "Q1"})))
            .unwrap();
        let outcome = cache
            .merge(None, fields(json!({"id": ID, "subject": "new"})))
            .unwrap();

        assert!(outcome.was_cached);
        assert_eq!(outcome.interaction.extra["subject"], "new");
        assert_eq!(outcome.interaction.extra["queue"], "Q1");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_each_status_stamps_only_its_field() {
        let mut cache = InteractionCache::new();
        let t1 = DateTime::parse_from_rfc3339("2024-05-01T10:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let t2 = DateTime::parse_from_rfc3339("2024-05-01T10:05:00Z")
            .unwrap()
            .with_timezone(&Utc);

        cache
            .merge_at(Some(InteractionStatus::Outgoing), fields(json!({"id": ID})), t1)
            .unwrap();
        let outcome = cache
            .merge_at(Some(InteractionStatus::Ended), fields(json!({"id": ID})), t2)
            .unwrap();

        let ts = &outcome.interaction.timestamps;
        assert_eq!(ts.get(InteractionStatus::Outgoing), Some(t1));
        assert_eq!(ts.get(InteractionStatus::Ended), Some(t2));
        assert_eq!(ts.get(InteractionStatus::Incoming), None);
    }

    #[test]
    fn test_unknown_status_merges_without_stamp() {
        let mut cache = InteractionCache::new();
        let outcome = cache
            .merge(InteractionStatus::parse("wrapup"), fields(json!({"id": ID})))
            .unwrap();
        assert_eq!(outcome.interaction.timestamps, LifecycleTimestamps::default());
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_peer_supplied_dates_are_kept_as_sent() {
        let mut cache = InteractionCache::new();
        let outcome = cache
            .merge(
                Some(InteractionStatus::Accepted),
                fields(json!({
                    "id": ID,
                    "date_incoming": "2024-05-01 10:00:00",
                    "date_outgoing": "2024-05-01T09:00:00Z",
                    "date_ended": 1714557600
                })),
            )
            .unwrap();

        let ts = &outcome.interaction.timestamps;
        assert_eq!(
            ts.raw(InteractionStatus::Incoming),
            Some(&Timestamp::Raw(json!("2024-05-01 10:00:00")))
        );
        assert_eq!(ts.get(InteractionStatus::Incoming), None);
        assert!(ts.get(InteractionStatus::Outgoing).is_some());
        assert!(ts.get(InteractionStatus::Accepted).is_some());

        let value = outcome.interaction.to_value();
        assert_eq!(value["date_incoming"], "2024-05-01 10:00:00");
        assert_eq!(value["date_outgoing"], "2024-05-01T09:00:00Z");
        assert_eq!(value["date_ended"], 1714557600);
        assert!(value.get("extra").is_none());

        let cleared = cache
            .merge(None, fields(json!({"id": ID, "date_ended": null})))
            .unwrap();
        assert!(cleared.interaction.timestamps.date_ended.is_none());
    }

    #[test]
    fn test_missing_id_is_rejected() {
        let mut cache = InteractionCache::new();
        assert!(cache.merge(None, fields(json!({"subject": "x"}))).is_err());
        assert!(cache.is_empty());
    }

    #[test]
    fn test_has_any_by_channel() {
        let mut cache = InteractionCache::new();
        assert!(!cache.has_any(None));

        cache
            .merge(
                Some(InteractionStatus::Incoming),
                fields(json!({"id": ID, "channel_type": "chat"})),
            )
            .unwrap();

        assert!(cache.has_any(None));
        assert!(cache.has_any(Some(ChannelType::Chat)));
        assert!(!cache.has_any(Some(ChannelType::Phone)));
    }

    #[test]
    fn test_serialized_shape_has_all_timestamps() {
        let mut cache = InteractionCache::new();
        let outcome = cache
            .merge(
                Some(InteractionStatus::Incoming),
                fields(json!({"id": ID, "channel_type": "email", "subject": "hi"})),
            )
            .unwrap();
        let value = outcome.interaction.to_value();

        assert_eq!(value["id"], ID);
        assert_eq!(value["channel_type"], "email");
        assert_eq!(value["subject"], "hi");
        assert!(value["date_incoming"].is_string());
        for field in [
            "date_outgoing",
            "date_accepted",
            "date_rejected",
            "date_ended",
            "date_handled",
        ] {
            assert!(value[field].is_null(), "{} should be null", field);
            assert!(value.get(field).is_some(), "{} should be present", field);
        }
    }

    #[test]
    fn test_unknown_channel_is_kept_verbatim() {
        let mut cache = InteractionCache::new();
        let outcome = cache
            .merge(None, fields(json!({"id": ID, "channel_type": "fax"})))
            .unwrap();
        assert_eq!(outcome.interaction.channel_type, None);
        assert_eq!(outcome.interaction.to_value()["channel_type"], "fax");
    }

    #[test]
    fn test_interaction_id_validation() {
        assert!(InteractionId::parse(ID).is_ok());
        assert!(InteractionId::parse("short").is_err());
        assert!(InteractionId::parse("1".repeat(33)).is_err());
    }

    #[test]
    fn test_channel_type_parse() {
        assert_eq!("sms".parse::<ChannelType>().unwrap(), ChannelType::Sms);
        assert!("pigeon".parse::<ChannelType>().is_err());
    }
}
