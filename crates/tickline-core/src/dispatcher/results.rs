use std::{collections::HashMap, sync::RwLock};

use serde_json::Value;
use tickline_model::TaskId;
use tokio::{sync::Notify, time::Instant};

use crate::sync::{read, write};

/// Last outcome per task id.
///
/// `Some(None)` means the task ran and failed; a missing entry means nothing
/// has been recorded under that id yet. Entries live as long as the dispatcher.
#[derive(Default)]
pub(crate) struct ResultSlots {
    slots: RwLock<HashMap<TaskId, Option<Value>>>,
    recorded: Notify,
}

impl ResultSlots {
    pub(crate) fn record(&self, id: TaskId, value: Option<Value>) {
        write(&self.slots).insert(id, value);
        self.recorded.notify_waiters();
    }

    pub(crate) fn lookup(&self, id: &str) -> Option<Option<Value>> {
        read(&self.slots).get(id).cloned()
    }

    /// Wait until something is recorded under `id` or `deadline` passes.
    pub(crate) async fn wait(&self, id: &str, deadline: Option<Instant>) -> Option<Value> {
        loop {
            // Register interest before checking so a record landing in between is not missed.
            let notified = self.recorded.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(outcome) = self.lookup(id) {
                return outcome;
            }

            match deadline {
                Some(deadline) => {
                    if tokio::time::timeout_at(deadline, notified).await.is_err() {
                        return None;
                    }
                }
                None => notified.await,
            }
        }
    }
}
