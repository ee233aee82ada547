use pulse_core::filter::AnomalyFilter;

#[derive(Debug)]
pub enum SessionCommand {
    /// Fetch the next trend page. Silent no-op while a trend load is in
    /// flight or the catalog is exhausted.
    LoadMoreTrends,
    /// Fetch the next anomaly history page, same guard per collection.
    LoadMoreAnomalies,
    /// Change the anomaly filter: resets the cursor, drops fetched pages,
    /// and re-queries page 0. The live set survives.
    SetFilter(AnomalyFilter),
    /// Re-seed both collections now instead of waiting for the next poll.
    Refresh,
    /// Close the push channel and end the session task.
    Shutdown,
}
