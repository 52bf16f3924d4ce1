// src/workflows/refresh.rs

use tokio::time::sleep;
use tracing::{debug, info};

use super::wrong_intent;
use crate::engine::{Intent, IntentTag, TaskContext};

/// Re-dispatch [`Intent::RefreshVms`] after every interval, forever.
///
/// The first refresh happens one interval after start: login has just
/// loaded the first page.
pub async fn scheduler_fixed_delay(ctx: TaskContext, intent: Intent) {
    if !matches!(intent, Intent::StartSchedulerFixedDelay) {
        return wrong_intent(IntentTag::StartSchedulerFixedDelay, &intent);
    }

    let interval = ctx.settings.refresh.interval();
    info!(?interval, "fixed-delay vm refresh started");

    loop {
        sleep(interval).await;
        debug!("scheduled vm refresh");
        ctx.dispatch(Intent::RefreshVms).await;
    }
}
