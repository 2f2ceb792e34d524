//! Call operations: originate, hangup, transfer

use crate::{
    command::{validate_no_newlines, validate_token},
    connection::EslClient,
    constants::DEFAULT_HANGUP_CAUSE,
    error::{EslError, EslResult},
};
use tracing::info;

/// Render one channel variable for an `{...}` originate prefix.
///
/// Commas are escaped since they separate variables; values containing
/// whitespace are single-quoted.
fn format_variable(key: &str, value: &str) -> EslResult<String> {
    validate_token(key, "variable name")?;
    if key.contains(['=', ',', '{', '}', '\'']) {
        return Err(EslError::invalid_argument(format!(
            "invalid variable name {:?}",
            key
        )));
    }
    validate_no_newlines(value, "variable value")?;
    if value.contains('\'') {
        return Err(EslError::invalid_argument(format!(
            "variable {} value must not contain single quotes",
            key
        )));
    }

    let escaped = value.replace(',', "\\,");
    if escaped
        .chars()
        .any(char::is_whitespace)
    {
        Ok(format!("{}='{}'", key, escaped))
    } else {
        Ok(format!("{}={}", key, escaped))
    }
}

/// `originate [{k=v,...}]<destination> &park()`. Variables keep the caller's order.
pub fn originate_command<I, K, V>(destination: &str, variables: I) -> EslResult<String>
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    validate_token(destination, "destination")?;

    let vars = variables
        .into_iter()
        .map(|(k, v)| format_variable(k.as_ref(), v.as_ref()))
        .collect::<EslResult<Vec<_>>>()?;

    if vars.is_empty() {
        Ok(format!("originate {} &park()", destination))
    } else {
        Ok(format!(
            "originate {{{}}}{} &park()",
            vars.join(","),
            destination
        ))
    }
}

/// `uuid_kill <uuid> <cause>`, cause defaulting to `NORMAL_CLEARING`.
pub fn hangup_command(call_uuid: &str, cause: Option<&str>) -> EslResult<String> {
    validate_token(call_uuid, "call uuid")?;
    let cause = cause.unwrap_or(DEFAULT_HANGUP_CAUSE);
    validate_token(cause, "hangup cause")?;
    Ok(format!("uuid_kill {} {}", call_uuid, cause))
}

/// `uuid_transfer <uuid> <destination>`. The destination may carry a dialplan
/// and context (`1000 XML default`).
pub fn transfer_command(call_uuid: &str, destination: &str) -> EslResult<String> {
    validate_token(call_uuid, "call uuid")?;
    validate_no_newlines(destination, "destination")?;
    if destination
        .trim()
        .is_empty()
    {
        return Err(EslError::invalid_argument("destination must not be empty"));
    }
    Ok(format!("uuid_transfer {} {}", call_uuid, destination.trim()))
}

/// Call UUID from an originate `+OK <uuid>` payload.
pub fn parse_originate_reply(payload: &str) -> EslResult<String> {
    match payload.split_whitespace().next() {
        Some(uuid) => Ok(uuid.to_string()),
        None => Err(EslError::UnexpectedReply {
            reply_text: "+OK without call uuid".to_string(),
        }),
    }
}

impl EslClient {
    /// Originate a call to `destination` and park it. Returns the new call's UUID.
    ///
    /// `originate` blocks until the far end answers or fails, so the command
    /// timeout should exceed the ring time.
    ///
    /// ```rust,no_run
    /// # async fn example(client: &conference_esl::EslClient) -> Result<(), conference_esl::EslError> {
    /// let uuid = client
    ///     .originate_call("sofia/gateway/pstn/+15551234", [("origination_caller_id_number", "5550100")])
    ///     .await?;
    /// client.transfer_call(&uuid, "3000 XML conferences").await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn originate_call<I, K, V>(&self, destination: &str, variables: I) -> EslResult<String>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let command = originate_command(destination, variables)?;
        let payload = self
            .api_checked(&command)
            .await?;
        let uuid = parse_originate_reply(&payload)?;
        info!(destination, call_uuid = %uuid, "Call originated");
        Ok(uuid)
    }

    /// Hang up a call; `None` uses `NORMAL_CLEARING`.
    pub async fn hangup_call(&self, call_uuid: &str, cause: Option<&str>) -> EslResult<()> {
        let command = hangup_command(call_uuid, cause)?;
        self.api_checked(&command)
            .await?;
        info!(call_uuid, "Call hung up");
        Ok(())
    }

    pub async fn transfer_call(&self, call_uuid: &str, destination: &str) -> EslResult<()> {
        let command = transfer_command(call_uuid, destination)?;
        self.api_checked(&command)
            .await?;
        info!(call_uuid, destination, "Call transferred");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;

    #[test]
    fn test_originate_without_variables() {
        let none: [(&str, &str); 0] = [];
        assert_eq!(
            originate_command("+15551234", none).unwrap(),
            "originate +15551234 &park()"
        );
    }

    #[test]
    fn test_originate_with_variables() {
        let mut vars = BTreeMap::new();
        vars.insert("conference_name", "room1");
        vars.insert("origination_caller_id_name", "Front Desk");
        vars.insert("sip_h_X-Tags", "a,b");
        assert_eq!(
            originate_command("user/1000", &vars).unwrap(),
            "originate {conference_name=room1,origination_caller_id_name='Front Desk',sip_h_X-Tags=a\\,b}user/1000 &park()"
        );
    }

    #[test]
    fn test_originate_rejects_bad_input() {
        assert!(originate_command("user/1000\napi shutdown", [("a", "b")]).is_err());
        assert!(originate_command("user/1000", [("bad=key", "v")]).is_err());
        assert!(originate_command("user/1000", [("k", "line\nbreak")]).is_err());
        assert!(originate_command("", [("k", "v")]).is_err());
    }

    #[test]
    fn test_hangup_default_cause() {
        assert_eq!(
            hangup_command("abcd-1234", None).unwrap(),
            "uuid_kill abcd-1234 NORMAL_CLEARING"
        );
        assert_eq!(
            hangup_command("abcd-1234", Some("USER_BUSY")).unwrap(),
            "uuid_kill abcd-1234 USER_BUSY"
        );
        assert!(hangup_command("abcd 1234", None).is_err());
    }

    #[test]
    fn test_transfer_command() {
        assert_eq!(
            transfer_command("abcd-1234", "3000 XML conferences").unwrap(),
            "uuid_transfer abcd-1234 3000 XML conferences"
        );
        assert!(transfer_command("abcd-1234", "  ").is_err());
        assert!(transfer_command("abcd-1234", "3000\n\nexit").is_err());
    }

    #[test]
    fn test_parse_originate_reply() {
        assert_eq!(
            parse_originate_reply("abcd-1234-uuid").unwrap(),
            "abcd-1234-uuid"
        );
        assert!(matches!(
            parse_originate_reply(""),
            Err(EslError::UnexpectedReply { .. })
        ));
    }
}
