use crate::cache::ResourceHandle;
use crate::name::Name;
use crossbeam_channel::Sender;
use std::any::Any;
use std::sync::Arc;

/// Decoded asset as delivered by a broker. Handlers downcast to the type they expect.
pub type AssetPayload = Arc<dyn Any + Send + Sync>;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum AssetType {
    Text,
    Binary,
    Image,
    Material,
    Shader,
    StaticMesh,
    Audio,
}

/// One asset sub-request bundled into a resource request
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AssetInfo {
    pub kind: AssetType,
    pub name: Name,
    pub package: Name,
}

impl AssetInfo {
    pub fn new(kind: AssetType, package: impl Into<Name>, name: impl Into<Name>) -> Self {
        Self {
            kind,
            name: name.into(),
            package: package.into(),
        }
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum AssetLoadError {
    #[error("Asset {package}/{name} does not exist")]
    NotFound { package: Name, name: Name },
    #[error("Failed to read asset: {0}")]
    Io(String),
    #[error("Failed to decode asset: {0}")]
    Decode(String),
    #[error("Asset load was abandoned")]
    Abandoned,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AssetRequest {
    pub kind: AssetType,
    pub name: Name,
    pub package: Name,
    /// The broker must deliver the result before `submit_load` returns
    pub synchronous: bool,
}

/// Identifies which resource, and which of its sub-requests, a result belongs to
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct AssetTicket {
    pub resource: ResourceHandle,
    pub asset_index: u32,
}

#[derive(Debug)]
pub struct AssetResult {
    pub ticket: AssetTicket,
    pub outcome: Result<AssetPayload, AssetLoadError>,
}

/// Return path for a single sub-request. Can be sent from any thread.
#[derive(Debug, Clone)]
pub struct AssetReply {
    ticket: AssetTicket,
    sender: Sender<AssetResult>,
}

impl AssetReply {
    pub(crate) fn new(ticket: AssetTicket, sender: Sender<AssetResult>) -> Self {
        Self { ticket, sender }
    }

    pub fn ticket(&self) -> AssetTicket {
        self.ticket
    }

    pub fn send(self, outcome: Result<AssetPayload, AssetLoadError>) {
        let result = AssetResult {
            ticket: self.ticket,
            outcome,
        };
        if let Err(e) = self.sender.send(result) {
            // cache is gone, nothing is waiting for this
            tracing::debug!("Dropping asset result for {:?}", e.0.ticket);
        }
    }
}

/// External loading collaborator.
///
/// Implementations resolve the asset at some later point, on any thread, and hand the outcome to
/// `reply`. The cache never blocks on a broker unless `request.synchronous` is set.
pub trait AssetBroker: Send + Sync {
    fn submit_load(&self, request: AssetRequest, reply: AssetReply);
}

/// Raw image: a little-endian `u32` width and height, a `u8` channel count, then tightly packed
/// 8-bit pixels.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ImageAsset {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
    pub pixels: Vec<u8>,
}

impl ImageAsset {
    const HEADER_LEN: usize = 9;

    pub fn new(width: u32, height: u32, channels: u8, pixels: Vec<u8>) -> Self {
        Self {
            width,
            height,
            channels,
            pixels,
        }
    }

    /// Single pixel image filled with `rgba`
    pub fn solid(rgba: [u8; 4]) -> Self {
        Self::new(1, 1, 4, rgba.to_vec())
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, AssetLoadError> {
        if bytes.len() < Self::HEADER_LEN {
            return Err(AssetLoadError::Decode(format!(
                "image header needs {} bytes, got {}",
                Self::HEADER_LEN,
                bytes.len()
            )));
        }
        let width = u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
        let height = u32::from_le_bytes([bytes[4], bytes[5], bytes[6], bytes[7]]);
        let channels = bytes[8];
        let expected = (width as usize)
            .checked_mul(height as usize)
            .and_then(|texels| texels.checked_mul(channels as usize))
            .ok_or_else(|| {
                AssetLoadError::Decode(format!(
                    "{width}x{height}x{channels} image is too large to address"
                ))
            })?;
        let pixels = &bytes[Self::HEADER_LEN..];
        if pixels.len() != expected {
            return Err(AssetLoadError::Decode(format!(
                "{width}x{height}x{channels} image needs {expected} pixel bytes, got {}",
                pixels.len()
            )));
        }
        Ok(Self::new(width, height, channels, pixels.to_vec()))
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(Self::HEADER_LEN + self.pixels.len());
        bytes.extend_from_slice(&self.width.to_le_bytes());
        bytes.extend_from_slice(&self.height.to_le_bytes());
        bytes.push(self.channels);
        bytes.extend_from_slice(&self.pixels);
        bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_decode() {
        let image = ImageAsset::new(2, 1, 3, vec![1, 2, 3, 4, 5, 6]);
        assert_eq!(ImageAsset::decode(&image.encode()), Ok(image));
    }

    #[test]
    fn test_image_decode_rejects_short_pixels() {
        let mut bytes = ImageAsset::new(2, 2, 4, vec![0; 16]).encode();
        bytes.truncate(bytes.len() - 1);
        assert!(matches!(
            ImageAsset::decode(&bytes),
            Err(AssetLoadError::Decode(_))
        ));
        assert!(matches!(
            ImageAsset::decode(&[0, 1]),
            Err(AssetLoadError::Decode(_))
        ));
    }

    #[test]
    fn test_image_decode_rejects_oversized_header() {
        let mut bytes = vec![0xff; 8];
        bytes.push(u8::MAX);
        bytes.extend_from_slice(&[0; 4]);
        assert!(matches!(
            ImageAsset::decode(&bytes),
            Err(AssetLoadError::Decode(_))
        ));
    }
}
