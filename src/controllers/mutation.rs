//! Create-link submission with local validation and cache reconciliation.

use std::fmt;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use url::Url;

use crate::api::types::{Link, NewLink};
use crate::api::{ApiClient, ApiError};
use crate::cache::{CacheWrite, QueryCache, QueryData, QueryKey, Resource};
use crate::notify::Notifier;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LinkField {
  WhiteUrl,
  BlackUrl,
}

impl LinkField {
  pub fn label(&self) -> &'static str {
    match self {
      LinkField::WhiteUrl => "White URL",
      LinkField::BlackUrl => "Black URL",
    }
  }
}

impl fmt::Display for LinkField {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.label())
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FieldErrorKind {
  #[error("is required")]
  Required,
  #[error("must be an absolute URL")]
  NotAbsolute,
  #[error("scheme '{0}' is not supported, use http or https")]
  UnsupportedScheme(String),
  #[error("is not a valid URL: {0}")]
  Malformed(String),
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{field} {kind}")]
pub struct FieldError {
  pub field: LinkField,
  pub kind: FieldErrorKind,
}

/// Check one URL field, returning the trimmed input.
pub fn validate_url(field: LinkField, raw: &str) -> Result<String, FieldError> {
  let fail = |kind| FieldError { field, kind };
  let value = raw.trim();
  if value.is_empty() {
    return Err(fail(FieldErrorKind::Required));
  }

  let url = Url::parse(value).map_err(|e| match e {
    url::ParseError::RelativeUrlWithoutBase => fail(FieldErrorKind::NotAbsolute),
    other => fail(FieldErrorKind::Malformed(other.to_string())),
  })?;

  match url.scheme() {
    "http" | "https" => {}
    other => return Err(fail(FieldErrorKind::UnsupportedScheme(other.to_string()))),
  }
  if url.host_str().map_or(true, str::is_empty) {
    return Err(fail(FieldErrorKind::Malformed("missing host".to_string())));
  }

  Ok(value.to_string())
}

/// Validate both fields, collecting every failure.
pub fn validate_link(input: &NewLink) -> Result<NewLink, Vec<FieldError>> {
  let white = validate_url(LinkField::WhiteUrl, &input.white_url);
  let black = validate_url(LinkField::BlackUrl, &input.black_url);
  match (white, black) {
    (Ok(white_url), Ok(black_url)) => Ok(NewLink {
      white_url,
      black_url,
    }),
    (white, black) => Err(white.err().into_iter().chain(black.err()).collect()),
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MutationError {
  #[error("{}", first_field_error(.0))]
  Invalid(Vec<FieldError>),
  #[error(transparent)]
  Transport(#[from] ApiError),
}

fn first_field_error(errors: &[FieldError]) -> String {
  errors
    .first()
    .map(|e| e.to_string())
    .unwrap_or_else(|| "invalid input".to_string())
}

impl MutationError {
  /// Validation error for one field, if any
  pub fn field(&self, field: LinkField) -> Option<&FieldError> {
    match self {
      MutationError::Invalid(errors) => errors.iter().find(|e| e.field == field),
      MutationError::Transport(_) => None,
    }
  }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum MutationState {
  #[default]
  Idle,
  Pending,
  Succeeded(Link),
  Failed(MutationError),
}

struct MutationOutcome {
  attempt: u64,
  result: Result<Link, ApiError>,
}

/// Drives one create-link write at a time.
///
/// The write runs on a spawned task. On success that task queues the cache
/// reconciliation on the cache itself, so it happens even if this controller
/// is dropped mid-write. The controller's own state follows via `poll()` or
/// `recv()` on the owner's task.
pub struct MutationController {
  state: MutationState,
  attempt: u64,
  tx: mpsc::UnboundedSender<MutationOutcome>,
  rx: mpsc::UnboundedReceiver<MutationOutcome>,
  events: Notifier<MutationState>,
}

impl Default for MutationController {
  fn default() -> Self {
    Self::new()
  }
}

impl MutationController {
  pub fn new() -> Self {
    let (tx, rx) = mpsc::unbounded_channel();
    Self {
      state: MutationState::Idle,
      attempt: 0,
      tx,
      rx,
      events: Notifier::new(),
    }
  }

  pub fn subscribe(&mut self) -> mpsc::UnboundedReceiver<MutationState> {
    self.events.subscribe()
  }

  pub fn state(&self) -> &MutationState {
    &self.state
  }

  pub fn is_pending(&self) -> bool {
    self.state == MutationState::Pending
  }

  /// Validate and start the write. Returns true if a request was sent.
  ///
  /// Invalid input fails immediately without touching the transport. While a
  /// write is pending further submissions are ignored.
  pub fn submit(&mut self, input: &NewLink, api: &ApiClient, cache: &QueryCache) -> bool {
    if self.is_pending() {
      return false;
    }

    let input = match validate_link(input) {
      Ok(input) => input,
      Err(errors) => {
        self.set_state(MutationState::Failed(MutationError::Invalid(errors)));
        return false;
      }
    };

    self.attempt += 1;
    let attempt = self.attempt;
    let api = api.clone();
    let writer = cache.writer();
    let tx = self.tx.clone();
    tokio::spawn(async move {
      let result = api.create_link(&input).await;
      match &result {
        Ok(link) => {
          info!(id = link.id, code = %link.code, "link created");
          writer.send(
            CacheWrite::new()
              .invalidate(Resource::Links)
              .seed(QueryKey::entity(Resource::Link, link.id), QueryData::Link(link.clone())),
          );
        }
        Err(e) => warn!(error = %e, "create link failed"),
      }
      // The cache write is queued first, so it is visible by the time the
      // outcome is applied
      let _ = tx.send(MutationOutcome { attempt, result });
    });

    self.set_state(MutationState::Pending);
    true
  }

  /// Forget the current attempt and return to idle.
  pub fn reset(&mut self) {
    self.attempt += 1;
    self.set_state(MutationState::Idle);
  }

  /// Apply finished writes without blocking. Returns true if any landed.
  pub fn poll(&mut self, cache: &mut QueryCache) -> bool {
    let mut applied = false;
    while let Ok(outcome) = self.rx.try_recv() {
      self.apply(outcome, cache);
      applied = true;
    }
    applied
  }

  /// Wait for the next finished write and apply it.
  #[cfg(test)]
  pub async fn recv(&mut self, cache: &mut QueryCache) -> bool {
    match self.rx.recv().await {
      Some(outcome) => {
        self.apply(outcome, cache);
        true
      }
      None => false,
    }
  }

  fn apply(&mut self, outcome: MutationOutcome, cache: &mut QueryCache) {
    cache.poll();
    if outcome.attempt != self.attempt {
      debug!(attempt = outcome.attempt, "ignoring superseded create result");
      return;
    }
    match outcome.result {
      Ok(link) => self.set_state(MutationState::Succeeded(link)),
      Err(e) => self.set_state(MutationState::Failed(MutationError::Transport(e))),
    }
  }

  fn set_state(&mut self, state: MutationState) {
    self.state = state;
    self.events.publish(self.state.clone());
  }
}
