//! RPC descriptors.
//!
//! A descriptor is a zero-sized type naming one method: its request and
//! response message types and its `:path`. Streaming capabilities are
//! marker traits, so a call shape that needs them is rejected at compile
//! time for a method that does not declare them.
//!
//! ```
//! use grpc_client::rpc;
//!
//! rpc!(pub Lookup, "/dns.Resolver/Lookup", String => String);
//! rpc!(pub Watch, "/dns.Resolver/Watch", String => String, ServerStreaming);
//!
//! use grpc_client::rpc::Rpc;
//! assert_eq!(Lookup::PATH, "/dns.Resolver/Lookup");
//! ```

use prost::Message;

/// Static description of one gRPC method.
pub trait Rpc {
    /// Request message.
    type Input: Message + Default + Send + Sync;
    /// Response message.
    type Output: Message + Default + Send;
    /// Request path, in the form `/package.Service/Method`.
    const PATH: &'static str;
}

/// The method accepts a stream of request messages.
pub trait ClientStreaming: Rpc {}

/// The method answers with a stream of response messages.
pub trait ServerStreaming: Rpc {}

/// Declare an RPC descriptor.
///
/// `rpc!(vis Name, "/pkg.Service/Method", Input => Output)` with optional
/// trailing capability markers (`ClientStreaming`, `ServerStreaming`).
#[macro_export]
macro_rules! rpc {
    (
        $(#[$meta:meta])*
        $vis:vis $name:ident, $path:literal, $input:ty => $output:ty
        $(, $cap:ident)* $(,)?
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, Default)]
        $vis struct $name;

        impl $crate::rpc::Rpc for $name {
            type Input = $input;
            type Output = $output;
            const PATH: &'static str = $path;
        }

        $(impl $crate::rpc::$cap for $name {})*
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Clone, PartialEq, prost::Message)]
    struct Key {
        #[prost(bytes = "vec", tag = "1")]
        key: Vec<u8>,
    }

    rpc!(
        /// Unary lookup.
        Get, "/cache.Cache/Get", Key => Key
    );
    rpc!(Scan, "/cache.Cache/Scan", Key => Key, ServerStreaming);
    rpc!(Mirror, "/cache.Cache/Mirror", Key => Key, ClientStreaming, ServerStreaming,);

    fn needs_server_streaming<R: ServerStreaming>() -> &'static str {
        R::PATH
    }

    fn needs_client_streaming<R: ClientStreaming>() -> &'static str {
        R::PATH
    }

    #[test]
    fn test_descriptor_path() {
        assert_eq!(Get::PATH, "/cache.Cache/Get");
        assert_eq!(needs_server_streaming::<Scan>(), "/cache.Cache/Scan");
        assert_eq!(needs_server_streaming::<Mirror>(), "/cache.Cache/Mirror");
        assert_eq!(needs_client_streaming::<Mirror>(), "/cache.Cache/Mirror");
    }

    #[test]
    fn test_descriptor_types() {
        let input: <Get as Rpc>::Input = Key { key: b"k".to_vec() };
        let bytes = input.encode_to_vec();
        let output = <Get as Rpc>::Output::decode(bytes.as_slice()).unwrap();
        assert_eq!(output.key, b"k");
    }
}
