//! Read-only position commands

use crate::client::Backend;
use crate::output::{print_info, print_position, PositionView, OutputFormat};
use dsc_core::{AccountSession, AccountSnapshot};
use std::time::Duration;

fn show(session: &AccountSession, snapshot: &AccountSnapshot, backend: &Backend, format: OutputFormat) {
    let view = PositionView::new(session.session(), snapshot, backend.registry());
    print_position(&view, snapshot.position.health_factor.status(), format);
}

/// One sync, print, disconnect.
pub async fn status(backend: &Backend, format: OutputFormat) -> anyhow::Result<()> {
    let session = backend.connect(None).await?;
    show(&session, &session.snapshot(), backend, format);
    session.disconnect().await;
    Ok(())
}

/// Print every completed sync pass until Ctrl-C.
pub async fn watch(backend: &Backend, period: Duration, format: OutputFormat) -> anyhow::Result<()> {
    let session = backend.connect(Some(period)).await?;
    let mut updates = session.synchronizer().subscribe();

    if format == OutputFormat::Table {
        print_info(&format!(
            "Refreshing every {}s, Ctrl-C to stop",
            period.as_secs()
        ));
    }
    show(&session, &updates.borrow_and_update(), backend, format);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                let snapshot = updates.borrow_and_update().clone();
                show(&session, &snapshot, backend, format);
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.disconnect().await;
    Ok(())
}
