use std::{fmt, time::Duration};

use crate::sources::{MediaStream, StreamKind};

/// Identidad de un recurso reproducible; nunca se reutiliza dentro de un controlador
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(pub u64);

impl fmt::Display for ResourceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Stream resuelto envuelto para el reproductor
#[derive(Debug, Clone, PartialEq)]
pub struct AudioResource {
    pub id: ResourceId,
    pub stream: MediaStream,
}

impl AudioResource {
    /// Posición del track donde empieza el recurso
    pub fn start(&self) -> Duration {
        self.stream.start
    }

    pub fn kind(&self) -> StreamKind {
        self.stream.kind
    }
}

/// Fabrica recursos con ids crecientes
#[derive(Debug, Default)]
pub struct ResourceBuilder {
    last: u64,
}

impl ResourceBuilder {
    pub fn build(&mut self, stream: MediaStream) -> AudioResource {
        self.last += 1;
        AudioResource {
            id: ResourceId(self.last),
            stream,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_never_reused() {
        let stream = MediaStream {
            url: "https://cdn.example/audio".to_string(),
            kind: StreamKind::OggOpus,
            start: Duration::from_secs(30),
        };
        let mut builder = ResourceBuilder::default();

        let first = builder.build(stream.clone());
        let second = builder.build(stream);

        assert!(second.id > first.id);
        assert_eq!(first.start(), Duration::from_secs(30));
        assert_eq!(first.kind(), StreamKind::OggOpus);
    }
}
