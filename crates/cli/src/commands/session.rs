//! Enqueueing session administration

use anyhow::Result;
use reindex_core::EnqueueingSession;

use super::Context;

/// Mutations and lookups on one entity type's session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionAction {
  Init,
  Suspend,
  Resume,
  Remove,
  Show,
}

pub async fn cmd_session(ctx: &Context, action: SessionAction, entity_type: &str, json: bool) -> Result<()> {
  let sessions = ctx.sessions();

  let (ran, verb) = match action {
    SessionAction::Init => (sessions.init_session(entity_type).await?, "Initialised"),
    SessionAction::Suspend => (sessions.suspend_session(entity_type).await?, "Suspended"),
    SessionAction::Resume => (sessions.resume_session(entity_type).await?, "Resumed"),
    SessionAction::Remove => (sessions.remove_session(entity_type).await?, "Removed"),
    SessionAction::Show => {
      match sessions.get_session(entity_type).await? {
        Some(session) if json => println!("{}", serde_json::to_string_pretty(&session)?),
        Some(session) => print_session(&session),
        None => println!("No enqueueing session for {}", entity_type),
      }
      return Ok(());
    }
  };

  if ran {
    println!("{} session for {}", verb, entity_type);
  } else {
    println!("Session for {} is locked by another caller, try again", entity_type);
  }
  Ok(())
}

pub async fn cmd_session_list(ctx: &Context, json: bool) -> Result<()> {
  let sessions = ctx.sessions().list_sessions().await?;

  if json {
    println!("{}", serde_json::to_string_pretty(&sessions)?);
    return Ok(());
  }

  if sessions.is_empty() {
    println!("No enqueueing sessions");
    return Ok(());
  }

  println!("{:<24} {:<10} {:<20} {}", "ENTITY", "STATUS", "ORDERING", "CURSOR");
  for session in &sessions {
    println!(
      "{:<24} {:<10} {:<20} {}",
      session.entity_type,
      session.status.as_str(),
      session.ordering.name(),
      session.last_ordering_value.as_deref().unwrap_or("-")
    );
  }
  Ok(())
}

fn print_session(session: &EnqueueingSession) {
  println!("Entity type:  {}", session.entity_type);
  println!("Status:       {}", session.status.as_str());
  match session.ordering.kind() {
    Some(kind) => println!("Ordering:     {} ({})", session.ordering.name(), kind.as_str()),
    None => println!("Ordering:     {} (composite, full scan)", session.ordering.name()),
  }
  println!(
    "Cursor:       {}",
    session.last_ordering_value.as_deref().unwrap_or("(start)")
  );
  println!("Created:      {}", session.created_at.format("%Y-%m-%d %H:%M:%S UTC"));
}
