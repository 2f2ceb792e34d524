//! Conference operations: command builders, reply parsers and their client methods

use crate::{
    command::validate_token,
    connection::EslClient,
    constants::{REPLY_ERR, REPLY_OK},
    error::{EslError, EslResult},
};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, info, trace};

/// Error returned when parsing an unrecognized member action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseMemberActionError(pub String);

impl std::fmt::Display for ParseMemberActionError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "unknown member action: {}", self.0)
    }
}

impl std::error::Error for ParseMemberActionError {}

define_wire_enum! {
    error_type: ParseMemberActionError,
    /// Per-member conference sub-commands.
    pub enum MemberAction {
        Kick => "kick",
        Mute => "mute",
        Unmute => "unmute",
        Deaf => "deaf",
        Undeaf => "undeaf",
    }
}

/// One running conference, from `conference list summary`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConferenceInfo {
    pub name: String,
    pub member_count: u32,
    /// Only when the listing carries a `run_time:` field.
    pub running_time: Option<Duration>,
    pub locked: bool,
    /// Only when the listing carries a `record:` field.
    pub recording_path: Option<String>,
}

/// One participant, from `conference <name> list`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConferenceMember {
    pub id: u32,
    pub call_uuid: String,
    pub caller_name: String,
    pub caller_number: String,
    pub muted: bool,
    pub deaf: bool,
    pub speaking: bool,
}

fn validate_conference_name(name: &str) -> EslResult<()> {
    validate_token(name, "conference name")
}

pub fn conference_list_command() -> String {
    "conference list summary".to_string()
}

pub fn member_list_command(conference: &str) -> EslResult<String> {
    validate_conference_name(conference)?;
    Ok(format!("conference {} list", conference))
}

/// `conference <name> <action> <member>`. The member may also be `all` or `last`.
pub fn member_action_command(
    conference: &str,
    action: MemberAction,
    member: &str,
) -> EslResult<String> {
    validate_conference_name(conference)?;
    validate_token(member, "member id")?;
    Ok(format!("conference {} {} {}", conference, action, member))
}

/// Strip a leading `+OK` so that prefixed and bare listings parse the same.
fn strip_ok(line: &str) -> &str {
    line.strip_prefix(REPLY_OK)
        .map(str::trim_start)
        .unwrap_or(line)
}

/// Parse a `conference list summary` body.
///
/// Lines look like
/// `Conference room1 (2 members rate: 16000 flags: running|answered|locked)`,
/// optionally prefixed with `+OK`. Lines in any other shape are skipped. An
/// empty body or `No active conferences` is an empty list; `-ERR` is a
/// domain error.
pub fn parse_conference_list(body: &str) -> EslResult<Vec<ConferenceInfo>> {
    let text = body.trim();
    if text.starts_with(REPLY_ERR) {
        return Err(EslError::CommandFailed {
            reply_text: text.to_string(),
        });
    }
    if text.is_empty() || text.contains("No active conferences") {
        return Ok(Vec::new());
    }

    let mut conferences = Vec::new();
    for line in text.lines() {
        match parse_summary_line(strip_ok(line.trim())) {
            Some(info) => conferences.push(info),
            None => trace!("Skipping conference list line: {:?}", line),
        }
    }
    Ok(conferences)
}

fn parse_summary_line(line: &str) -> Option<ConferenceInfo> {
    let rest = line.strip_prefix("Conference ")?;
    let (name, details) = rest.split_once(" (")?;
    let details = details
        .trim_end()
        .strip_suffix(')')?;

    let member_count = details
        .split_whitespace()
        .next()?
        .parse()
        .ok()?;

    let flags = field_after(details, "flags:").unwrap_or("");
    let locked = flags
        .split('|')
        .any(|f| f.trim() == "locked");
    let running_time = field_after(details, "run_time:")
        .and_then(|v| {
            v.trim_end_matches('s')
                .parse()
                .ok()
        })
        .map(Duration::from_secs);
    let recording_path = field_after(details, "record:").map(str::to_string);

    Some(ConferenceInfo {
        name: name.to_string(),
        member_count,
        running_time,
        locked,
        recording_path,
    })
}

/// First whitespace-delimited value following `key` inside `details`.
fn field_after<'a>(details: &'a str, key: &str) -> Option<&'a str> {
    let (_, after) = details.split_once(key)?;
    after
        .split_whitespace()
        .next()
}

/// `true` when the body says the conference does not exist.
fn is_conference_not_found(text: &str) -> bool {
    let text = text
        .trim_start_matches(REPLY_ERR)
        .trim();
    text.starts_with("Conference ") && text.ends_with("not found")
}

/// Parse a `conference <name> list` body.
///
/// Rows are `id;call-uuid;caller-name;caller-number;flags;...`. Switch builds
/// that put the channel name in the second column
/// (`id;channel;uuid;name;number;flags;...`) are recognized by the `/` in
/// that column. A "not found" reply is an empty list.
pub fn parse_member_list(body: &str) -> EslResult<Vec<ConferenceMember>> {
    let text = body.trim();
    if text.is_empty() || is_conference_not_found(text) {
        return Ok(Vec::new());
    }
    if text.starts_with(REPLY_ERR) {
        return Err(EslError::CommandFailed {
            reply_text: text.to_string(),
        });
    }

    let mut members = Vec::new();
    for line in text.lines() {
        match parse_member_row(strip_ok(line.trim())) {
            Some(member) => members.push(member),
            None => trace!("Skipping member list line: {:?}", line),
        }
    }
    Ok(members)
}

fn parse_member_row(line: &str) -> Option<ConferenceMember> {
    let fields: Vec<&str> = line
        .split(';')
        .collect();
    let id: u32 = fields
        .first()?
        .trim()
        .parse()
        .ok()?;

    let columns = if fields.len() >= 6 && fields[1].contains('/') {
        &fields[2..]
    } else {
        &fields[1..]
    };
    if columns.len() < 4 {
        return None;
    }

    let (muted, deaf, speaking) = parse_member_flags(columns[3]);
    Some(ConferenceMember {
        id,
        call_uuid: columns[0].to_string(),
        caller_name: columns[1].to_string(),
        caller_number: columns[2].to_string(),
        muted,
        deaf,
        speaking,
    })
}

/// `(muted, deaf, speaking)` from a `|`-separated flag list.
///
/// The switch lists capabilities: a member without `speak` is muted and one
/// without `hear` is deaf. Explicit `mute`/`deaf` flags are honored too.
pub fn parse_member_flags(flags: &str) -> (bool, bool, bool) {
    let has = |name: &str| {
        flags
            .split('|')
            .any(|f| f.trim() == name)
    };
    let muted = has("mute") || !has("speak");
    let deaf = has("deaf") || !has("hear");
    let speaking = has("talking");
    (muted, deaf, speaking)
}

impl EslClient {
    /// Check a conference name (and optional profile) without contacting the switch.
    ///
    /// The switch creates a room on the first join, so there is nothing to
    /// send; this exists so callers have a create/list/kick lifecycle.
    pub fn create_conference(&self, name: &str, profile: Option<&str>) -> EslResult<()> {
        validate_conference_name(name)?;
        if let Some(profile) = profile {
            validate_token(profile, "conference profile")?;
        }
        debug!(conference = name, ?profile, "Conference will be created on first join");
        Ok(())
    }

    pub async fn list_conferences(&self) -> EslResult<Vec<ConferenceInfo>> {
        let body = self
            .api(&conference_list_command())
            .await?;
        parse_conference_list(&body)
    }

    /// Members of one conference; empty if it does not exist.
    pub async fn list_conference_members(
        &self,
        conference: &str,
    ) -> EslResult<Vec<ConferenceMember>> {
        let command = member_list_command(conference)?;
        let body = self
            .api(&command)
            .await?;
        parse_member_list(&body)
    }

    /// Run one per-member action; anything but `+OK` is a domain error.
    pub async fn member_action(
        &self,
        conference: &str,
        action: MemberAction,
        member: &str,
    ) -> EslResult<()> {
        let command = member_action_command(conference, action, member)?;
        self.api_checked(&command)
            .await?;
        info!(conference, member, "Conference member {}", action);
        Ok(())
    }

    pub async fn kick_member(&self, conference: &str, member: &str) -> EslResult<()> {
        self.member_action(conference, MemberAction::Kick, member)
            .await
    }

    pub async fn mute_member(&self, conference: &str, member: &str) -> EslResult<()> {
        self.member_action(conference, MemberAction::Mute, member)
            .await
    }

    pub async fn unmute_member(&self, conference: &str, member: &str) -> EslResult<()> {
        self.member_action(conference, MemberAction::Unmute, member)
            .await
    }

    pub async fn deafen_member(&self, conference: &str, member: &str) -> EslResult<()> {
        self.member_action(conference, MemberAction::Deaf, member)
            .await
    }

    pub async fn undeafen_member(&self, conference: &str, member: &str) -> EslResult<()> {
        self.member_action(conference, MemberAction::Undeaf, member)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_member_action_commands() {
        assert_eq!(
            member_action_command("room1", MemberAction::Kick, "42").unwrap(),
            "conference room1 kick 42"
        );
        assert_eq!(
            member_action_command("room1", MemberAction::Undeaf, "all").unwrap(),
            "conference room1 undeaf all"
        );
        assert_eq!("DEAF".parse::<MemberAction>(), Ok(MemberAction::Deaf));
    }

    #[test]
    fn test_command_arguments_validated() {
        assert!(matches!(
            member_action_command("room 1", MemberAction::Mute, "42"),
            Err(EslError::InvalidArgument(_))
        ));
        assert!(member_action_command("room1", MemberAction::Mute, "").is_err());
        assert!(member_list_command("room1\napi shutdown").is_err());
        assert_eq!(
            member_list_command("room1").unwrap(),
            "conference room1 list"
        );
    }

    #[test]
    fn test_parse_conference_list() {
        let body = "+OK Conference room1 (2 members rate: 16000 flags: running|answered|locked)\n\
                    +OK Conference 3001 (1 member rate: 8000 flags: running|answered|dynamic)\n";
        let list = parse_conference_list(body).unwrap();
        assert_eq!(list.len(), 2);
        assert_eq!(list[0].name, "room1");
        assert_eq!(list[0].member_count, 2);
        assert!(list[0].locked);
        assert_eq!(list[1].name, "3001");
        assert_eq!(list[1].member_count, 1);
        assert!(!list[1].locked);
        assert_eq!(list[1].running_time, None);
        assert_eq!(list[1].recording_path, None);
    }

    #[test]
    fn test_parse_conference_list_optional_fields() {
        let body = "Conference sales (3 members rate: 48000 run_time: 125s record: /tmp/sales.wav flags: running|recording)";
        let list = parse_conference_list(body).unwrap();
        assert_eq!(list[0].running_time, Some(Duration::from_secs(125)));
        assert_eq!(list[0].recording_path.as_deref(), Some("/tmp/sales.wav"));
    }

    #[test]
    fn test_parse_conference_list_empty() {
        assert!(parse_conference_list("No active conferences.\n")
            .unwrap()
            .is_empty());
        assert!(parse_conference_list("+OK No active conferences.")
            .unwrap()
            .is_empty());
        assert!(parse_conference_list("")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_parse_conference_list_err() {
        let err = parse_conference_list("-ERR Command not found!\n").unwrap_err();
        assert_eq!(err.reply_text(), Some("-ERR Command not found!"));
    }

    #[test]
    fn test_parse_member_list() {
        let body = "7;6f9c-uuid;Alice;1001;hear|speak|talking|floor\n\
                    8;a1b2-uuid;Bob;1002;hear\n\
                    9;c3d4-uuid;Carol;1003;speak|deaf\n";
        let members = parse_member_list(body).unwrap();
        assert_eq!(members.len(), 3);

        assert_eq!(members[0].id, 7);
        assert_eq!(members[0].call_uuid, "6f9c-uuid");
        assert_eq!(members[0].caller_name, "Alice");
        assert_eq!(members[0].caller_number, "1001");
        assert!(!members[0].muted);
        assert!(!members[0].deaf);
        assert!(members[0].speaking);

        assert!(members[1].muted);
        assert!(!members[1].deaf);
        assert!(!members[1].speaking);

        assert!(!members[2].muted);
        assert!(members[2].deaf);
    }

    #[test]
    fn test_parse_member_list_with_channel_column() {
        let body = "3;sofia/internal/1000@10.0.0.1;aaaa-uuid;Dan;1000;hear|speak;0;0;300\n";
        let members = parse_member_list(body).unwrap();
        assert_eq!(members[0].id, 3);
        assert_eq!(members[0].call_uuid, "aaaa-uuid");
        assert_eq!(members[0].caller_name, "Dan");
        assert_eq!(members[0].caller_number, "1000");
        assert!(!members[0].muted);
    }

    #[test]
    fn test_member_list_not_found_is_empty() {
        assert!(parse_member_list("Conference empty-room not found\n")
            .unwrap()
            .is_empty());
        assert!(parse_member_list("-ERR Conference empty-room not found\n")
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_member_list_skips_malformed_rows() {
        let body = "garbage\n5;uuid-5;Eve;1005;hear|speak\nx;y\n";
        let members = parse_member_list(body).unwrap();
        assert_eq!(members.len(), 1);
        assert_eq!(members[0].id, 5);
    }

    #[test]
    fn test_member_flags() {
        assert_eq!(parse_member_flags("hear|speak"), (false, false, false));
        assert_eq!(parse_member_flags("hear|speak|talking"), (false, false, true));
        assert_eq!(parse_member_flags("hear|speak|mute"), (true, false, false));
        assert_eq!(parse_member_flags(""), (true, true, false));
    }
}
