use std::collections::HashMap;

/// String metadata that travels with a message: HTTP headers, gRPC metadata
/// or a plain map.
pub trait Carrier {
    fn get(&self, key: &str) -> Option<&str>;
    /// Implementations may drop values their format cannot represent.
    fn set(&mut self, key: &str, value: String);
}

impl<S> Carrier for HashMap<String, String, S>
where
    S: std::hash::BuildHasher,
{
    fn get(&self, key: &str) -> Option<&str> {
        HashMap::get(self, key).map(String::as_str)
    }

    fn set(&mut self, key: &str, value: String) {
        self.insert(key.to_string(), value);
    }
}

#[cfg(feature = "http-carrier")]
impl Carrier for hyper::header::HeaderMap {
    fn get(&self, key: &str) -> Option<&str> {
        hyper::header::HeaderMap::get(self, key).and_then(|value| value.to_str().ok())
    }

    fn set(&mut self, key: &str, value: String) {
        let name = match hyper::header::HeaderName::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(error) => {
                log::debug!("dropping header {key}: {error}");
                return;
            }
        };
        match hyper::header::HeaderValue::try_from(value) {
            Ok(value) => {
                self.insert(name, value);
            }
            Err(error) => log::debug!("dropping header {key}: {error}"),
        }
    }
}

#[cfg(feature = "grpc-carrier")]
impl Carrier for tonic::metadata::MetadataMap {
    fn get(&self, key: &str) -> Option<&str> {
        tonic::metadata::MetadataMap::get(self, key).and_then(|value| value.to_str().ok())
    }

    fn set(&mut self, key: &str, value: String) {
        let name = match tonic::metadata::AsciiMetadataKey::from_bytes(key.as_bytes()) {
            Ok(name) => name,
            Err(error) => {
                log::debug!("dropping metadata {key}: {error}");
                return;
            }
        };
        match value.parse::<tonic::metadata::AsciiMetadataValue>() {
            Ok(value) => {
                self.insert(name, value);
            }
            Err(error) => log::debug!("dropping metadata {key}: {error}"),
        }
    }
}
