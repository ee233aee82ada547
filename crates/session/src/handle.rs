use crate::actor::DashboardSnapshot;
use crate::commands::SessionCommand;
use anyhow::Result;
use pulse_core::filter::AnomalyFilter;
use tokio::sync::{mpsc, watch};

/// Cloneable handle to a running dashboard session.
#[derive(Clone)]
pub struct SessionHandle {
    tx: mpsc::Sender<SessionCommand>,
    snapshot_rx: watch::Receiver<DashboardSnapshot>,
}

impl SessionHandle {
    #[must_use]
    pub fn new(
        tx: mpsc::Sender<SessionCommand>,
        snapshot_rx: watch::Receiver<DashboardSnapshot>,
    ) -> Self {
        Self { tx, snapshot_rx }
    }

    /// Requests the next trend catalog page.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the session actor.
    pub async fn load_more_trends(&self) -> Result<()> {
        self.tx.send(SessionCommand::LoadMoreTrends).await?;
        Ok(())
    }

    /// Requests the next anomaly history page.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the session actor.
    pub async fn load_more_anomalies(&self) -> Result<()> {
        self.tx.send(SessionCommand::LoadMoreAnomalies).await?;
        Ok(())
    }

    /// Applies a new anomaly filter.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the session actor.
    pub async fn set_filter(&self, filter: AnomalyFilter) -> Result<()> {
        self.tx.send(SessionCommand::SetFilter(filter)).await?;
        Ok(())
    }

    /// Triggers an immediate full refresh of both collections.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the session actor.
    pub async fn refresh(&self) -> Result<()> {
        self.tx.send(SessionCommand::Refresh).await?;
        Ok(())
    }

    /// Shuts down the session, closing the push channel.
    ///
    /// # Errors
    /// Returns an error if the command cannot be sent to the session actor.
    pub async fn shutdown(&self) -> Result<()> {
        self.tx.send(SessionCommand::Shutdown).await?;
        Ok(())
    }

    /// The latest published snapshot.
    #[must_use]
    pub fn snapshot(&self) -> DashboardSnapshot {
        self.snapshot_rx.borrow().clone()
    }

    /// Subscribes to snapshot changes.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<DashboardSnapshot> {
        self.snapshot_rx.clone()
    }
}
