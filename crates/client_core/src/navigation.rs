use std::{fmt, str::FromStr, sync::Mutex};

use shared::domain::DocumentId;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Destination {
    DocumentList,
    EditDocument(DocumentId),
    NewDocument,
}

impl Destination {
    pub fn path(&self) -> String {
        match self {
            Destination::DocumentList => "/documentos".to_string(),
            Destination::EditDocument(id) => format!("/documentos/{id}"),
            Destination::NewDocument => "/documentos/nuevo".to_string(),
        }
    }
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("no route for '{0}'")]
pub struct UnknownRoute(pub String);

impl FromStr for Destination {
    type Err = UnknownRoute;

    fn from_str(raw: &str) -> Result<Self, Self::Err> {
        let path = raw.trim().trim_end_matches('/');
        match path {
            "" | "/documentos" => return Ok(Destination::DocumentList),
            "/documentos/nuevo" => return Ok(Destination::NewDocument),
            _ => {}
        }
        path.strip_prefix("/documentos/")
            .and_then(|id| id.parse::<i64>().ok())
            .map(|id| Destination::EditDocument(DocumentId(id)))
            .ok_or_else(|| UnknownRoute(raw.to_string()))
    }
}

pub trait Navigator: Send + Sync {
    fn navigate(&self, destination: Destination);
}

/// Records where the application was sent; the front end reads `current`.
#[derive(Debug)]
pub struct LoggingNavigator {
    current: Mutex<Destination>,
}

impl Default for LoggingNavigator {
    fn default() -> Self {
        Self {
            current: Mutex::new(Destination::DocumentList),
        }
    }
}

impl LoggingNavigator {
    pub fn current(&self) -> Destination {
        *self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }
}

impl Navigator for LoggingNavigator {
    fn navigate(&self, destination: Destination) {
        info!(path = %destination, "navigating");
        *self
            .current
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner) = destination;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_parse_back_to_destinations() {
        for destination in [
            Destination::DocumentList,
            Destination::NewDocument,
            Destination::EditDocument(DocumentId(42)),
        ] {
            assert_eq!(destination.path().parse::<Destination>(), Ok(destination));
        }
        assert_eq!("/".parse::<Destination>(), Ok(Destination::DocumentList));
        assert!("/documentos/abc".parse::<Destination>().is_err());
    }

    #[test]
    fn logging_navigator_tracks_last_destination() {
        let navigator = LoggingNavigator::default();
        navigator.navigate(Destination::EditDocument(DocumentId(3)));
        assert_eq!(navigator.current(), Destination::EditDocument(DocumentId(3)));
    }
}
