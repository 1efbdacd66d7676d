use async_trait::async_trait;

use crate::error::MediaAcquisitionError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MediaConstraints {
    pub audio: bool,
    pub video: bool,
}

impl MediaConstraints {
    /// Calls always capture audio; video is optional.
    pub fn call(video: bool) -> Self {
        Self { audio: true, video }
    }
}

/// Handle to a local or remote media stream. The media itself never passes
/// through this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaStream {
    pub id: String,
    pub audio: bool,
    pub video: bool,
}

/// Local capture capability.
#[async_trait]
pub trait MediaDevices: Send + Sync {
    async fn acquire(
        &self,
        constraints: MediaConstraints,
    ) -> Result<MediaStream, MediaAcquisitionError>;

    /// Stop every track of a stream obtained from [`MediaDevices::acquire`].
    fn release(&self, stream: &MediaStream);
}
