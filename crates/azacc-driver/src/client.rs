use async_trait::async_trait;
use azacc_domain::{ArmResourceId, Disk, VirtualMachine};

use crate::error::DriverError;

/// Outcome of a single read against the compute API.
///
/// A 404 is a successful answer (`NotFound`), never an error. Anything else
/// that prevents an answer is a `TransportError`.
#[derive(Debug)]
pub enum Lookup<T> {
    Found(T),
    NotFound,
    TransportError(DriverError),
}

impl<T> Lookup<T> {
    pub fn exists(&self) -> bool {
        matches!(self, Lookup::Found(_))
    }

    pub fn found(self) -> Option<T> {
        match self {
            Lookup::Found(v) => Some(v),
            _ => None,
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Lookup<U> {
        match self {
            Lookup::Found(v) => Lookup::Found(f(v)),
            Lookup::NotFound => Lookup::NotFound,
            Lookup::TransportError(e) => Lookup::TransportError(e),
        }
    }

    /// `Ok(Some)` for found, `Ok(None)` for not found.
    pub fn into_result(self) -> Result<Option<T>, DriverError> {
        match self {
            Lookup::Found(v) => Ok(Some(v)),
            Lookup::NotFound => Ok(None),
            Lookup::TransportError(e) => Err(e),
        }
    }
}

/// Read-only access to the compute resources the checks inspect.
#[async_trait]
pub trait ComputeClient: Send + Sync + 'static {
    fn name(&self) -> &'static str;

    async fn get_disk(&self, resource_group: &str, name: &str) -> Lookup<Disk>;

    /// Read a disk from an explicit subscription rather than the one the
    /// client was configured with.
    async fn get_disk_in(&self, subscription_id: &str, resource_group: &str, name: &str) -> Lookup<Disk> {
        let _ = subscription_id;
        self.get_disk(resource_group, name).await
    }

    async fn get_virtual_machine(&self, resource_group: &str, name: &str) -> Lookup<VirtualMachine>;
}

/// Fetch the managed disk an identifier points at.
///
/// The subscription, resource group and `disks` segment are all taken from
/// the id, whatever subscription the client defaults to. An id
/// without a `disks` segment is reported as a transport error since no read
/// can be issued for it.
pub async fn fetch_disk(client: &dyn ComputeClient, id: &ArmResourceId) -> Lookup<Disk> {
    let Some(name) = id.disk_name() else {
        return Lookup::TransportError(DriverError::InvalidResourceId(format!(
            "{} has no disks segment",
            id
        )));
    };
    client
        .get_disk_in(&id.subscription_id, &id.resource_group, name)
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn map_transforms_only_found() {
        assert!(matches!(Lookup::Found(2).map(|n| n * 10), Lookup::Found(20)));
        assert!(matches!(Lookup::<i32>::NotFound.map(|n| n * 10), Lookup::NotFound));
        let failed = Lookup::<i32>::TransportError(DriverError::Transport("reset".into()));
        assert!(matches!(
            failed.map(|n| n * 10),
            Lookup::TransportError(DriverError::Transport(ref m)) if m == "reset"
        ));
    }

    #[test]
    fn into_result_keeps_not_found_apart_from_errors() {
        assert_eq!(Lookup::Found("d1").into_result().unwrap(), Some("d1"));
        assert_eq!(Lookup::<&str>::NotFound.into_result().unwrap(), None);
        let err = Lookup::<&str>::TransportError(DriverError::Transport("reset".into()))
            .into_result()
            .unwrap_err();
        assert!(matches!(err, DriverError::Transport(_)));
    }
}
