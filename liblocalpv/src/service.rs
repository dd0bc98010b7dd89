//! Dispatch of [`ProvisionerMessage`] requests onto a [`Provisioner`].

use tracing::{debug, warn};

use crate::error::ProvisionError;
use crate::message::ProvisionerMessage;
use crate::provisioner::Provisioner;

/// Map a request to the matching [`Provisioner`] call and wrap the result in
/// a response message.
///
/// Response variants received as requests yield
/// [`ProvisionerMessage::Error`] with [`ProvisionError::InvalidArgument`].
pub async fn dispatch<P>(provisioner: &P, request: ProvisionerMessage) -> ProvisionerMessage
where
    P: Provisioner + ?Sized,
{
    debug!(%request, "provisioner request received");
    let response = match request {
        ProvisionerMessage::Provision(options) => match provisioner.provision(options).await {
            Ok((volume, state)) => ProvisionerMessage::Provisioned { volume, state },
            Err(failure) => ProvisionerMessage::ProvisionFailed(failure),
        },
        ProvisionerMessage::Delete(volume) => match provisioner.delete(&volume).await {
            Ok(()) => ProvisionerMessage::Deleted,
            Err(e) => ProvisionerMessage::Error(e),
        },
        ProvisionerMessage::GetInfo => ProvisionerMessage::Info(provisioner.info()),

        other => {
            warn!(msg = %other, "unexpected message variant received as request");
            ProvisionerMessage::Error(ProvisionError::InvalidArgument(format!(
                "unexpected message: {other}"
            )))
        }
    };
    debug!(%response, "provisioner response");
    response
}
