//! Periodischer Bereinigungs-Task fuer den Sitzungs-Store
//!
//! Der Task wird beim Serverstart ueber [`SitzungsStore::bereinigung_starten`]
//! gestartet und beim Shutdown ueber [`BereinigungsHandle::stoppen`] beendet.
//! Wird der Handle ohne `stoppen` fallen gelassen, bricht er den Task ab.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::store::SitzungsStore;

/// Besitzt den laufenden Bereinigungs-Task
#[derive(Debug)]
pub struct BereinigungsHandle {
    stopp_tx: Option<oneshot::Sender<()>>,
    task: Option<JoinHandle<()>>,
}

impl BereinigungsHandle {
    /// Signalisiert dem Task das Ende und wartet auf ihn
    pub async fn stoppen(mut self) {
        if let Some(tx) = self.stopp_tx.take() {
            let _ = tx.send(());
        }
        if let Some(task) = self.task.take() {
            if let Err(e) = task.await {
                tracing::warn!(fehler = %e, "Bereinigungs-Task endete fehlerhaft");
            }
        }
    }

    pub fn laeuft(&self) -> bool {
        self.task.as_ref().is_some_and(|t| !t.is_finished())
    }
}

impl Drop for BereinigungsHandle {
    fn drop(&mut self) {
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl SitzungsStore {
    /// Startet den periodischen Bereinigungs-Task auf der aktuellen Tokio-Runtime
    pub fn bereinigung_starten(self: &Arc<Self>, intervall: Duration) -> BereinigungsHandle {
        let store = Arc::clone(self);
        let (stopp_tx, mut stopp_rx) = oneshot::channel::<()>();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(intervall);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Erster Tick kommt sofort
            ticker.tick().await;

            tracing::debug!(intervall_ms = intervall.as_millis() as u64, "Sitzungs-Bereinigung gestartet");

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let entfernt = store.bereinigen();
                        if entfernt > 0 {
                            tracing::debug!(
                                anzahl = entfernt,
                                verbleibend = store.anzahl(),
                                "Abgelaufene Sitzungen bereinigt"
                            );
                        }
                    }
                    _ = &mut stopp_rx => {
                        tracing::debug!("Sitzungs-Bereinigung beendet");
                        break;
                    }
                }
            }
        });

        BereinigungsHandle {
            stopp_tx: Some(stopp_tx),
            task: Some(task),
        }
    }
}
