//! Payload decoding collaborator.

use crate::model::ResourceName;
use crate::reply::Reply;

/// Completion handle for a decode request. `Err` carries the decoder's
/// message.
pub type DecodeReply<T> = Reply<Result<T, String>>;

/// Where a bundle's bytes come from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BundleSource {
    /// A loose plain file the decoder opens itself.
    File { read_only: bool, path: String },
    /// Bytes already read and decrypted.
    Memory(Vec<u8>),
}

/// Turns resource bytes into engine objects. Opaque to the runtime.
///
/// Every request completes through its reply, possibly before the call
/// returns. Completions are consumed on the loader's next tick.
pub trait AssetDecoder {
    type Bundle: Clone;
    type Asset: Clone;

    fn parse_bundle(&mut self, resource: &ResourceName, source: BundleSource, reply: DecodeReply<Self::Bundle>);

    fn load_asset(
        &mut self,
        bundle: &Self::Bundle,
        asset_name: &str,
        asset_type: Option<&str>,
        is_scene: bool,
        reply: DecodeReply<Self::Asset>,
    );

    fn unload_scene(&mut self, scene_name: &str, scene: &Self::Asset, reply: DecodeReply<()>);

    /// The asset object was released from the pool.
    fn release_asset(&mut self, _asset: &Self::Asset) {}

    fn release_bundle(&mut self, _bundle: &Self::Bundle) {}
}
