// Local crates
use crate::messaging::{
    models::{ConnectionParams, DeliveryPosition, SessionMode, Subscription},
    transport::{Error, Transport},
};

// External crates
use tracing::{error, info, instrument};

/// Create the one subscription a listen command drains: queue-grouped when a
/// group is set, plain otherwise. The position only matters in streaming mode.
#[instrument(
    name = "listener::subscribe",
    skip_all,
    level = "debug",
    fields(subject = %params.subject, group = ?params.group)
)]
pub async fn subscribe<T: Transport>(
    transport: &T,
    params: &ConnectionParams,
    position: DeliveryPosition,
) -> Result<Subscription, Error> {
    let mode = SessionMode::for_params(params);

    let result = match params.group.as_deref() {
        Some(group) => {
            transport
                .subscribe_grouped(&params.subject, group, position)
                .await
        }
        None => transport.subscribe(&params.subject, position).await,
    };

    match &result {
        Ok(_) => info!(
            subject = %params.subject,
            group = params.group.as_deref().unwrap_or_default(),
            mode = mode.as_str(),
            ?position,
            "Subscribed"
        ),
        Err(e) => error!(
            error = %e,
            subject = %params.subject,
            group = params.group.as_deref().unwrap_or_default(),
            mode = mode.as_str(),
            "Failed to subscribe"
        ),
    }

    result
}
