//! Terminal command parsing

use serde_json::Value;
use tellerline_core::UserId;

/// One line of terminal input
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Say(String),
    Typing(bool),
    Offer(UserId, Value),
    Answer(UserId, Value),
    Candidate(UserId, Value),
    End(UserId),
    Busy(UserId),
    Reconnect,
    Quit,
    /// Blank line
    Nothing,
}

pub fn parse(line: &str) -> Result<Command, String> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(Command::Nothing);
    }
    let Some(rest) = line.strip_prefix('/') else {
        return Ok(Command::Say(line.to_string()));
    };

    let (name, args) = match rest.split_once(char::is_whitespace) {
        Some((name, args)) => (name, args.trim()),
        None => (rest, ""),
    };

    match name {
        "typing" => match args {
            "on" => Ok(Command::Typing(true)),
            "off" => Ok(Command::Typing(false)),
            _ => Err("usage: /typing on|off".into()),
        },
        "offer" => user_and_json(args).map(|(user, v)| Command::Offer(user, v)),
        "answer" => user_and_json(args).map(|(user, v)| Command::Answer(user, v)),
        "candidate" => user_and_json(args).map(|(user, v)| Command::Candidate(user, v)),
        "end" => user(args).map(Command::End),
        "busy" => user(args).map(Command::Busy),
        "reconnect" => Ok(Command::Reconnect),
        "quit" | "exit" => Ok(Command::Quit),
        other => Err(format!("unknown command /{}", other)),
    }
}

fn user(args: &str) -> Result<UserId, String> {
    if args.is_empty() {
        return Err("missing user id".into());
    }
    args.parse().map_err(|e| format!("{}", e))
}

fn user_and_json(args: &str) -> Result<(UserId, Value), String> {
    let Some((target, payload)) = args.split_once(char::is_whitespace) else {
        return Err("usage: /<signal> <user> <json>".into());
    };
    let target = user(target)?;
    let payload = serde_json::from_str(payload.trim()).map_err(|e| format!("bad JSON: {}", e))?;
    Ok((target, payload))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn uid(id: &str) -> UserId {
        UserId::new(id).unwrap()
    }

    #[test]
    fn test_plain_text_is_a_message() {
        assert_eq!(parse("  hello there "), Ok(Command::Say("hello there".into())));
        assert_eq!(parse(""), Ok(Command::Nothing));
    }

    #[test]
    fn test_signal_commands() {
        assert_eq!(
            parse(r#"/offer u2 {"sdp":"v=0"}"#),
            Ok(Command::Offer(uid("u2"), json!({ "sdp": "v=0" })))
        );
        assert_eq!(
            parse(r#"/candidate u2 {"candidate":"c1", "sdpMid":"0"}"#),
            Ok(Command::Candidate(uid("u2"), json!({ "candidate": "c1", "sdpMid": "0" })))
        );
        assert_eq!(parse("/end u2"), Ok(Command::End(uid("u2"))));
        assert_eq!(parse("/busy u3"), Ok(Command::Busy(uid("u3"))));
    }

    #[test]
    fn test_control_commands() {
        assert_eq!(parse("/typing on"), Ok(Command::Typing(true)));
        assert_eq!(parse("/typing off"), Ok(Command::Typing(false)));
        assert_eq!(parse("/reconnect"), Ok(Command::Reconnect));
        assert_eq!(parse("/quit"), Ok(Command::Quit));
    }

    #[test]
    fn test_bad_input_is_rejected() {
        assert!(parse("/typing maybe").is_err());
        assert!(parse("/offer u2").is_err());
        assert!(parse("/offer u2 {not json").is_err());
        assert!(parse("/end").is_err());
        assert!(parse("/end bad/id").is_err());
        assert!(parse("/dance").is_err());
    }
}
