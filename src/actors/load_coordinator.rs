use ractor::{Actor, ActorProcessingErr, ActorRef, RpcReplyPort, SpawnErr};
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{Result, StargazerError};
use crate::loader::Loader;
use crate::models::{SourceTarget, StargazerRecord};

/// Single writer in front of the destination store.
///
/// Sources may be fetched concurrently, but every load goes through this
/// actor's mailbox and is handled to completion before the next one starts.
pub struct LoadCoordinator;

pub struct LoadCoordinatorState {
    loader: Loader,
    loads_completed: u64,
    loads_failed: u64,
    rows_loaded: u64,
}

#[derive(Debug)]
pub enum LoadCoordinatorMessage {
    /// Replace the stored rows of a source; replies with the verified row count
    Load {
        target: SourceTarget,
        records: Vec<StargazerRecord>,
        reply: RpcReplyPort<Result<u64>>,
    },
    /// Get statistics about loads handled so far
    GetStats(RpcReplyPort<LoadStats>),
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LoadStats {
    pub loads_completed: u64,
    pub loads_failed: u64,
    pub rows_loaded: u64,
}

impl LoadCoordinator {
    pub async fn spawn(
        loader: Loader,
    ) -> std::result::Result<(ActorRef<LoadCoordinatorMessage>, JoinHandle<()>), SpawnErr> {
        Actor::spawn(None, LoadCoordinator, loader).await
    }
}

#[ractor::async_trait]
impl Actor for LoadCoordinator {
    type Msg = LoadCoordinatorMessage;
    type State = LoadCoordinatorState;
    type Arguments = Loader;

    async fn pre_start(
        &self,
        _myself: ActorRef<Self::Msg>,
        loader: Self::Arguments,
    ) -> std::result::Result<Self::State, ActorProcessingErr> {
        info!(backend = loader.store().name(), "Load coordinator starting");

        Ok(LoadCoordinatorState {
            loader,
            loads_completed: 0,
            loads_failed: 0,
            rows_loaded: 0,
        })
    }

    async fn handle(
        &self,
        _myself: ActorRef<Self::Msg>,
        message: Self::Msg,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        match message {
            LoadCoordinatorMessage::Load {
                target,
                records,
                reply,
            } => {
                let result = state.loader.load(&records, &target).await;

                match &result {
                    Ok(rows) => {
                        state.loads_completed += 1;
                        state.rows_loaded += rows;
                    }
                    Err(e) => {
                        state.loads_failed += 1;
                        error!(source = %target.full_name, "Load failed: {}", e);
                    }
                }

                if !reply.is_closed() {
                    let _ = reply.send(result);
                }
            }

            LoadCoordinatorMessage::GetStats(reply) => {
                let stats = LoadStats {
                    loads_completed: state.loads_completed,
                    loads_failed: state.loads_failed,
                    rows_loaded: state.rows_loaded,
                };
                if !reply.is_closed() {
                    let _ = reply.send(stats);
                }
            }
        }

        Ok(())
    }

    async fn post_stop(
        &self,
        _myself: ActorRef<Self::Msg>,
        state: &mut Self::State,
    ) -> std::result::Result<(), ActorProcessingErr> {
        info!(
            loads_completed = state.loads_completed,
            loads_failed = state.loads_failed,
            rows_loaded = state.rows_loaded,
            "Load coordinator stopped"
        );
        Ok(())
    }
}

/// Queue a load behind any in progress and wait for its outcome.
pub async fn load(
    coordinator: &ActorRef<LoadCoordinatorMessage>,
    target: SourceTarget,
    records: Vec<StargazerRecord>,
) -> Result<u64> {
    let call = coordinator
        .call(
            |reply| LoadCoordinatorMessage::Load {
                target,
                records,
                reply,
            },
            None,
        )
        .await
        .map_err(|e| StargazerError::Internal(format!("Load coordinator unavailable: {}", e)))?;

    match call {
        ractor::rpc::CallResult::Success(result) => result,
        ractor::rpc::CallResult::Timeout => {
            Err(StargazerError::Internal("Load request timed out".to_string()))
        }
        ractor::rpc::CallResult::SenderError => Err(StargazerError::Internal(
            "Load coordinator stopped before replying".to_string(),
        )),
    }
}

pub async fn stats(coordinator: &ActorRef<LoadCoordinatorMessage>) -> Result<LoadStats> {
    match coordinator
        .call(LoadCoordinatorMessage::GetStats, Some(std::time::Duration::from_secs(5)))
        .await
    {
        Ok(ractor::rpc::CallResult::Success(stats)) => Ok(stats),
        Ok(_) => Err(StargazerError::Internal("No stats reply from load coordinator".to_string())),
        Err(e) => Err(StargazerError::Internal(format!("Load coordinator unavailable: {}", e))),
    }
}
