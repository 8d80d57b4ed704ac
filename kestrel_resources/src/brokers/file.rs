use crate::asset::{
    AssetBroker, AssetLoadError, AssetPayload, AssetReply, AssetRequest, AssetType, ImageAsset,
};
use derivative::Derivative;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Turns the raw bytes of a file into a decoded asset
pub type AssetDecoder = Arc<dyn Fn(Vec<u8>) -> Result<AssetPayload, AssetLoadError> + Send + Sync>;

/// Broker reading `<root>/<package>/<name>` through `tokio::fs` on a runtime it owns.
///
/// Text, binary and raw image assets decode out of the box, other asset types need a decoder
/// registered with [`FileBroker::with_decoder`]. Must not be dropped or used synchronously from
/// inside another tokio runtime.
///
/// Package and asset names are case-insensitive [`Name`](crate::name::Name)s, so files are looked
/// up by the spelling each name was first created with. On case-sensitive filesystems keep file
/// names and the names they are requested by in one consistent case.
#[derive(Derivative)]
#[derivative(Debug)]
pub struct FileBroker {
    root: PathBuf,
    runtime: tokio::runtime::Runtime,
    #[derivative(Debug = "ignore")]
    decoders: HashMap<AssetType, AssetDecoder>,
}

impl FileBroker {
    pub fn new(root: impl Into<PathBuf>) -> std::io::Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("kestrel-assets")
            .enable_all()
            .build()?;
        let mut decoders: HashMap<AssetType, AssetDecoder> = HashMap::new();
        decoders.insert(
            AssetType::Text,
            Arc::new(|bytes: Vec<u8>| {
                String::from_utf8(bytes)
                    .map(|text| Arc::new(text) as AssetPayload)
                    .map_err(|e| AssetLoadError::Decode(e.to_string()))
            }),
        );
        decoders.insert(
            AssetType::Binary,
            Arc::new(|bytes: Vec<u8>| Ok::<_, AssetLoadError>(Arc::new(bytes) as AssetPayload)),
        );
        decoders.insert(
            AssetType::Image,
            Arc::new(|bytes: Vec<u8>| {
                ImageAsset::decode(&bytes).map(|image| Arc::new(image) as AssetPayload)
            }),
        );
        Ok(Self {
            root: root.into(),
            runtime,
            decoders,
        })
    }

    pub fn with_decoder(mut self, kind: AssetType, decoder: AssetDecoder) -> Self {
        self.decoders.insert(kind, decoder);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<package>/<name>`, spelled as each name was first created
    pub fn path_for(&self, request: &AssetRequest) -> PathBuf {
        self.root
            .join(request.package.to_string())
            .join(request.name.to_string())
    }
}

async fn load(
    path: PathBuf,
    request: AssetRequest,
    decoder: AssetDecoder,
) -> Result<AssetPayload, AssetLoadError> {
    let bytes = tokio::fs::read(&path).await.map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => AssetLoadError::NotFound {
            package: request.package,
            name: request.name,
        },
        _ => AssetLoadError::Io(format!("{}: {}", path.display(), e)),
    })?;
    tracing::trace!("Read {} bytes from {}", bytes.len(), path.display());
    decoder(bytes)
}

impl AssetBroker for FileBroker {
    fn submit_load(&self, request: AssetRequest, reply: AssetReply) {
        let Some(decoder) = self.decoders.get(&request.kind).cloned() else {
            reply.send(Err(AssetLoadError::Decode(format!(
                "no decoder for {:?} assets",
                request.kind
            ))));
            return;
        };
        let path = self.path_for(&request);
        if request.synchronous {
            reply.send(self.runtime.block_on(load(path, request, decoder)));
        } else {
            self.runtime.spawn(async move {
                reply.send(load(path, request, decoder).await);
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::asset::{AssetResult, AssetTicket};
    use crate::name::Name;
    use kestrel_containers::prelude::Handle;
    use std::time::Duration;

    fn scratch_root(test: &str) -> PathBuf {
        let root = std::env::temp_dir().join(format!(
            "kestrel-file-broker-{}-{}",
            test,
            std::process::id()
        ));
        std::fs::create_dir_all(root.join("pkg")).unwrap();
        root
    }

    fn submit(
        broker: &FileBroker,
        kind: AssetType,
        name: &str,
        synchronous: bool,
    ) -> crossbeam_channel::Receiver<AssetResult> {
        let (send, recv) = crossbeam_channel::unbounded();
        let reply = AssetReply::new(
            AssetTicket {
                resource: Handle::invalid(),
                asset_index: 0,
            },
            send,
        );
        broker.submit_load(
            AssetRequest {
                kind,
                name: Name::new(name),
                package: Name::new("pkg"),
                synchronous,
            },
            reply,
        );
        recv
    }

    #[test]
    fn test_async_text() {
        let root = scratch_root("text");
        std::fs::write(root.join("pkg").join("greeting.txt"), "hello").unwrap();
        let broker = FileBroker::new(&root).unwrap();
        let recv = submit(&broker, AssetType::Text, "greeting.txt", false);
        let result = recv.recv_timeout(Duration::from_secs(5)).unwrap();
        let text = result.outcome.unwrap();
        assert_eq!(text.downcast_ref::<String>().unwrap(), "hello");
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_sync_image() {
        let root = scratch_root("image");
        let image = ImageAsset::new(1, 2, 4, vec![7; 8]);
        std::fs::write(root.join("pkg").join("tile.img"), image.encode()).unwrap();
        let broker = FileBroker::new(&root).unwrap();
        let recv = submit(&broker, AssetType::Image, "tile.img", true);
        // synchronous requests have replied already
        let result = recv.try_recv().unwrap();
        assert_eq!(
            result.outcome.unwrap().downcast_ref::<ImageAsset>(),
            Some(&image)
        );
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_path_uses_first_spelling() {
        let root = scratch_root("spelling");
        let broker = FileBroker::new(&root).unwrap();
        Name::new("Mixed-Case-Sprite.img");
        let request = AssetRequest {
            kind: AssetType::Image,
            name: Name::new("mixed-case-sprite.IMG"),
            package: Name::new("pkg"),
            synchronous: true,
        };
        assert!(
            broker
                .path_for(&request)
                .ends_with(Path::new("pkg").join("Mixed-Case-Sprite.img"))
        );
        std::fs::remove_dir_all(root).ok();
    }

    #[test]
    fn test_missing_and_undecodable() {
        let root = scratch_root("missing");
        let broker = FileBroker::new(&root).unwrap();
        let recv = submit(&broker, AssetType::Binary, "nope.bin", true);
        match recv.try_recv().unwrap().outcome {
            Err(AssetLoadError::NotFound { .. }) => {}
            _ => panic!("Expected NotFound error"),
        }
        let recv = submit(&broker, AssetType::Audio, "song.ogg", false);
        match recv.try_recv().unwrap().outcome {
            Err(AssetLoadError::Decode(_)) => {}
            _ => panic!("Expected Decode error"),
        }
        std::fs::remove_dir_all(root).ok();
    }
}
