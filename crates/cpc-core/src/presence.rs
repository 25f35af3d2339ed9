//! Presence profile and ready state changes through the RMI API.
//!
//! The panel does not report changes made over REST, so both operations
//! synthesize the status event the panel would have sent and deliver it to
//! the host handler as well as returning it.

use reqwest::Method;
use serde_json::{json, Value};
use tracing::{info, warn};

use crate::events::SyntheticEvent;
use crate::interactions::is_uid;
use crate::rest::{RestApi, RestClient, RestOutcome};
use crate::session::Session;

/// Switch the current user's presence profile, by id or by name.
///
/// Returns `None` when the session cannot make the call yet. Otherwise the
/// returned event is `cpc-profileChange`, carrying either the applied
/// profile or an `error`.
pub async fn set_presence(session: &Session, rest: &RestClient, profile: &str) -> Option<Value> {
    let user_id = ready_user(session, "set profile")?;
    let event = presence_event(session, rest, &user_id, profile).await;
    session.events().emit(event.clone());
    Some(event)
}

async fn presence_event(
    session: &Session,
    rest: &RestClient,
    user_id: &str,
    profile: &str,
) -> Value {
    let id = SyntheticEvent::PROFILE_CHANGE;
    let profiles = match rest
        .request(
            RestApi::Rmi,
            Method::GET,
            &format!("/agents/{}/presences/", user_id),
            None,
        )
        .await
    {
        Ok(RestOutcome::Json(Value::Array(profiles))) => profiles,
        Ok(outcome @ RestOutcome::Failed(_)) => {
            warn!("Cannot get user profiles");
            return SyntheticEvent::failed(id, outcome.to_value());
        }
        Ok(other) => {
            warn!("Cannot get user profiles: unexpected answer {}", other.to_value());
            return SyntheticEvent::failed(id, other.to_value());
        }
        Err(e) => {
            warn!("Cannot get user profiles: {}", e);
            return SyntheticEvent::failed(id, json!(e.to_string()));
        }
    };

    let key = if is_uid(profile) { "id" } else { "name" };
    let Some(selected) = profiles
        .into_iter()
        .find(|p| p.get(key).and_then(Value::as_str) == Some(profile))
    else {
        warn!("Cannot find profile by name: {}", profile);
        return SyntheticEvent::failed(id, json!("Unknown profile name"));
    };

    let profile_id = selected
        .get("id")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let profile_name = selected
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    match rest
        .request(
            RestApi::Rmi,
            Method::PUT,
            &format!("/agents/{}/presences/{}", user_id, profile_id),
            Some(selected.clone()),
        )
        .await
    {
        Ok(RestOutcome::Failed(failure)) => {
            warn!(
                "Profile [{}]:[{}] was not set: {:?}",
                profile_id, profile_name, failure
            );
            SyntheticEvent::failed(id, RestOutcome::Failed(failure).to_value())
        }
        Ok(_) => {
            session.update_current_user("presence", json!(profile_id));
            info!("Profile [{}]:[{}] is set.", profile_id, profile_name);
            SyntheticEvent::profile_changed(selected)
        }
        Err(e) => SyntheticEvent::failed(id, json!(e.to_string())),
    }
}

/// Switch the current user between Ready and NotReady.
///
/// Returns `None` when the session cannot make the call yet, else the
/// `cpc-readyState` event that was also emitted.
pub async fn set_ready(session: &Session, rest: &RestClient, ready: bool) -> Option<Value> {
    let user_id = ready_user(session, "set ready state")?;
    let (ready_state, work_status) = if ready {
        ("Ready", "ready")
    } else {
        ("NotReady", "not_ready")
    };

    let outcome = rest
        .request(
            RestApi::Rmi,
            Method::PUT,
            &format!("/agents/{}/readyState/", user_id),
            Some(json!({ "readyState": ready_state })),
        )
        .await;

    let event = match outcome {
        Ok(outcome) if outcome.is_error() => {
            warn!("Could not switch to [{}] state.", ready_state);
            SyntheticEvent::failed(SyntheticEvent::READY_STATE, outcome.to_value())
        }
        Ok(_) => {
            info!("Switched to [{}].", ready_state);
            SyntheticEvent::ready_state_changed(work_status)
        }
        Err(e) => {
            warn!("Could not switch to [{}] state: {}", ready_state, e);
            SyntheticEvent::failed(SyntheticEvent::READY_STATE, json!(e.to_string()))
        }
    };
    session.events().emit(event.clone());
    Some(event)
}

fn ready_user(session: &Session, what: &str) -> Option<String> {
    match session.current_user_id() {
        Some(id) if session.is_initialized() => Some(id),
        _ => {
            warn!(
                "Cannot {}. CPC is not initialized to interact with Communication Panel. Make sure load() was called and the user is logged in",
                what
            );
            None
        }
    }
}
