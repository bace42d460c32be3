use shared::domain::{ClientToken, ConversationId};

/// A line typed at the prompt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    List,
    Open(ConversationId),
    Close,
    Focus,
    Blur,
    Retry(ClientToken),
    Discard(ClientToken),
    Quit,
    Send(String),
    Nothing,
}

impl Command {
    pub fn parse(line: &str) -> Result<Self, String> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(Self::Nothing);
        }
        let Some(rest) = line.strip_prefix('/') else {
            return Ok(Self::Send(line.to_owned()));
        };

        let (name, argument) = match rest.split_once(char::is_whitespace) {
            Some((name, argument)) => (name, argument.trim()),
            None => (rest, ""),
        };
        let required = |usage: &str| {
            if argument.is_empty() {
                Err(format!("usage: /{name} {usage}"))
            } else {
                Ok(argument)
            }
        };

        match name {
            "list" => Ok(Self::List),
            "open" => required("<conversation-id>").map(|id| Self::Open(ConversationId::from(id))),
            "close" => Ok(Self::Close),
            "focus" => Ok(Self::Focus),
            "blur" => Ok(Self::Blur),
            "retry" => required("<client-token>").map(|token| Self::Retry(ClientToken::from(token))),
            "discard" => {
                required("<client-token>").map(|token| Self::Discard(ClientToken::from(token)))
            }
            "quit" | "exit" => Ok(Self::Quit),
            other => Err(format!("unknown command /{other}")),
        }
    }
}
