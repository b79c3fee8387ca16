use std::fmt;
use std::io::Error;

use derive_setters::Setters;
use ratatui::crossterm::event::KeyEvent;
use tracing_error::{SpanTrace, SpanTraceStatus};

use crate::api::ApiError;
use crate::query::Fetched;
use crate::settings::SettingsError;

pub const DEFAULT_HOST: &str = "121.4.251.254";
pub const DEFAULT_PORT: &str = "5035";

pub const HELP_TEXT: &str = "\
Tab        switch between Data and Favoritte
j/k ↑/↓    select row        PgUp/PgDn  jump 10 rows
g/G        first/last row    Enter      show/hide details
Space f    toggle favorite   r          refresh
h/p        edit host/port    t          save & test connection
/          edit search       Esc        clear search / close popup
e          edit meet         s          save meet
F          meet=favorite     c          clear meet
y          copy row as JSON  q          quit
";

#[derive(Debug, Clone, Setters)]
pub struct AppConfig {
    pub event_poll_time: u64,
    pub browse_page_size: u32,
    pub favorites_page_size: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            event_poll_time: 100,
            browse_page_size: 50,
            favorites_page_size: 200,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    Data,
    Favorites,
}

/// Text inputs that can take keyboard focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Field {
    Host,
    Port,
    Search,
    Meet,
}

#[derive(Debug)]
pub enum Message {
    Quit,
    Exit,
    Help,
    NextScreen,
    MoveUp,
    MoveDown,
    MovePageUp,
    MovePageDown,
    MoveBeginning,
    MoveEnd,
    ToggleDetails,
    ToggleFavorite,
    Edit(Field),
    SaveAndTest,
    SaveMeet,
    SetFavoriteText,
    ClearMeetText,
    Refresh,
    CopyRow,
    RawKey(KeyEvent),
    Fetched(Fetched),
}

#[derive(Debug)]
pub enum ErrorKind {
    Io(Error),
    Api(ApiError),
    Settings(SettingsError),
    Server(String),
    InvalidArgument(String),
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Io(e) => write!(f, "io error: {e}"),
            ErrorKind::Api(e) => write!(f, "{e}"),
            ErrorKind::Settings(e) => write!(f, "{e}"),
            ErrorKind::Server(msg) => write!(f, "static host failed: {msg}"),
            ErrorKind::InvalidArgument(msg) => write!(f, "invalid argument: {msg}"),
        }
    }
}

/// Application error together with the span trace of where it surfaced.
#[derive(Debug)]
pub struct WSError {
    kind: ErrorKind,
    context: SpanTrace,
}

impl WSError {
    pub fn new(kind: ErrorKind) -> Self {
        Self {
            kind,
            context: SpanTrace::capture(),
        }
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidArgument(msg.into()))
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.kind
    }
}

impl fmt::Display for WSError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.kind)?;
        if self.context.status() == SpanTraceStatus::CAPTURED {
            write!(f, "\n{}", self.context)?;
        }
        Ok(())
    }
}

impl std::error::Error for WSError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match &self.kind {
            ErrorKind::Io(e) => Some(e),
            ErrorKind::Api(e) => Some(e),
            ErrorKind::Settings(e) => Some(e),
            ErrorKind::Server(_) | ErrorKind::InvalidArgument(_) => None,
        }
    }
}

impl From<Error> for WSError {
    fn from(err: Error) -> Self {
        WSError::new(ErrorKind::Io(err))
    }
}

impl From<ApiError> for WSError {
    fn from(err: ApiError) -> Self {
        WSError::new(ErrorKind::Api(err))
    }
}

impl From<SettingsError> for WSError {
    fn from(err: SettingsError) -> Self {
        WSError::new(ErrorKind::Settings(err))
    }
}

impl From<serde_json::Error> for WSError {
    fn from(err: serde_json::Error) -> Self {
        WSError::new(ErrorKind::Io(err.into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_setters_chain() {
        let cfg = AppConfig::default().event_poll_time(10).browse_page_size(5);
        assert_eq!(cfg.event_poll_time, 10);
        assert_eq!(cfg.browse_page_size, 5);
        assert_eq!(cfg.favorites_page_size, 200);
    }

    #[test]
    fn errors_keep_their_kind() {
        let err: WSError = Error::other("disk gone").into();
        assert!(matches!(err.kind(), ErrorKind::Io(_)));
        assert!(err.to_string().starts_with("io error: disk gone"));

        let err = WSError::invalid_argument("--set needs KEY=VALUE");
        assert_eq!(err.to_string(), "invalid argument: --set needs KEY=VALUE");
    }
}
