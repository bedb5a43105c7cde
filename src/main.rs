#[cfg(feature = "client")]
use hr_notify::configuration::get_configuration;
#[cfg(feature = "client")]
use hr_notify::controller::InboxController;
#[cfg(feature = "client")]
use hr_notify::rest::NotificationApi;
#[cfg(feature = "client")]
use hr_notify::state::role::Role;
#[cfg(feature = "client")]
use hr_notify::telemetry::{get_subscriber, init_subscriber};
#[cfg(feature = "client")]
use hr_notify::transport::PushClient;
#[cfg(feature = "client")]
use futures_util::StreamExt;
#[cfg(feature = "client")]
use std::sync::Arc;
#[cfg(feature = "client")]
use std::time::Duration;
#[cfg(feature = "client")]
use tokio_stream::wrappers::BroadcastStream;

#[tokio::main]
#[cfg(feature = "client")]
async fn main() -> anyhow::Result<()> {
    let subscriber = get_subscriber("hr-notify".into(), "info".into(), std::io::stdout);
    init_subscriber(subscriber);

    let configuration = get_configuration()?;
    let role = configuration.role.unwrap_or(Role::Employe);
    let token = configuration.access_token.clone();

    let api = NotificationApi::new(&configuration.api_base, token.clone());
    let push = Arc::new(PushClient::new(configuration.push_channel()));
    let controller = Arc::new(InboxController::new(
        api,
        push.clone(),
        role,
        configuration.page_size,
    ));

    controller.bootstrap(token.as_deref()).await?;
    tracing::info!(
        role = %role,
        unread = controller.unread_count().await,
        "Inbox ready"
    );

    let stream = {
        let controller = controller.clone();
        let events = push.subscribe();
        tokio::spawn(async move { controller.run(events).await })
    };

    let mut live = BroadcastStream::new(push.subscribe());
    let mut counter_poll = tokio::time::interval(Duration::from_secs(60));
    counter_poll.tick().await;

    loop {
        tokio::select! {
            Some(event) = live.next() => {
                if let Ok(notification) = event {
                    tracing::info!(
                        id = notification.id,
                        subject = notification.display_subject(),
                        message = %notification.display_message(),
                        "Notification"
                    );
                }
            }
            _ = counter_poll.tick() => {
                match controller.refresh_unread_count().await {
                    Ok(unread) => tracing::info!(unread, "Unread counter refreshed"),
                    Err(err) => tracing::warn!(error = ?err, "Unread counter refresh failed"),
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    tracing::info!("Shutting down");
    push.disconnect();
    stream.abort();
    Ok(())
}
