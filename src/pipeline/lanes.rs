//! # Lanes
//!
//! One transform per action variant. Each takes the sub-stream of its own
//! variant's payloads and turns every payload into a short result sequence.
//!
//! ```text
//! lane                   fan-out      sequence per action
//! ClearErrorState        map          Success
//! GetPsiCashRemote       merge_map    InFlight, Success | Failure
//! GetPsiCashLocal        merge_map    InFlight, Success | Failure
//! RemovePurchases        merge_map    InFlight, Success | Failure
//! MakeExpiringPurchase   merge_map    InFlight, Success | Failure | GetPsiCash::Success
//! LoadVideoAd            switch_map   Loading, events*, Finished | Failure
//! ```
//!
//! Collaborator failures become `Failure` values here and go no further.

use std::future::Future;
use std::sync::Arc;

use futures::stream::{self, BoxStream, StreamExt};
use log::{debug, info};

use crate::client::{AdClient, ClientError, RewardClient, VideoRequest};
use crate::core::model::{Balance, ConnectionState, PurchaseOutcome, PurchasePrice, VideoEvent};
use crate::core::result::{
    ClearErrorStateResult, ExpiringPurchaseResult, GetPsiCashResult, PsiCashResult, VideoResult,
};
use crate::pipeline::combinators::{append_on_complete, catch, merge_map, prepend, switch_map};
use crate::pipeline::worker::{offload, offload_stream};

/// Payload of `Action::MakeExpiringPurchase`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PurchaseRequest {
    pub connection_state: ConnectionState,
    pub price: PurchasePrice,
    pub has_active_boost: bool,
}

pub fn clear_error_state(actions: BoxStream<'static, ()>) -> BoxStream<'static, PsiCashResult> {
    actions
        .map(|()| PsiCashResult::ClearErrorState(ClearErrorStateResult::Success))
        .boxed()
}

pub fn get_psicash_remote(
    actions: BoxStream<'static, ConnectionState>,
    reward: Arc<dyn RewardClient>,
) -> BoxStream<'static, PsiCashResult> {
    merge_map(actions, move |connection_state| {
        let reward = reward.clone();
        balance_call("GetPsiCashRemote", async move {
            reward.fetch_remote(connection_state).await
        })
    })
    .boxed()
}

pub fn get_psicash_local(
    actions: BoxStream<'static, ()>,
    reward: Arc<dyn RewardClient>,
) -> BoxStream<'static, PsiCashResult> {
    merge_map(actions, move |()| {
        let reward = reward.clone();
        balance_call("GetPsiCashLocal", async move { reward.fetch_local().await })
    })
    .boxed()
}

pub fn remove_purchases(
    actions: BoxStream<'static, Vec<String>>,
    reward: Arc<dyn RewardClient>,
) -> BoxStream<'static, PsiCashResult> {
    merge_map(actions, move |purchase_ids: Vec<String>| {
        let reward = reward.clone();
        balance_call("RemovePurchases", async move {
            reward.remove_purchases(&purchase_ids).await
        })
    })
    .boxed()
}

pub fn make_expiring_purchase(
    actions: BoxStream<'static, PurchaseRequest>,
    reward: Arc<dyn RewardClient>,
) -> BoxStream<'static, PsiCashResult> {
    merge_map(actions, move |request: PurchaseRequest| {
        let reward = reward.clone();
        let outcome = stream::once(async move {
            offload(async move {
                reward
                    .purchase(
                        request.connection_state,
                        &request.price,
                        request.has_active_boost,
                    )
                    .await
            })
            .await
            .and_then(|outcome| outcome)
        })
        .map(|outcome| outcome.map(purchase_result))
        .inspect(|outcome| log_failure("MakeExpiringPurchase", outcome));

        prepend(
            ExpiringPurchaseResult::InFlight.into(),
            catch(outcome, |e| ExpiringPurchaseResult::Failure(e).into()),
        )
    })
    .boxed()
}

/// Each new action replaces the video load before it; the superseded load is
/// aborted and none of its remaining results are emitted.
pub fn load_video_ad(
    actions: BoxStream<'static, ConnectionState>,
    reward: Arc<dyn RewardClient>,
    ads: Arc<dyn AdClient>,
    event_buffer: usize,
) -> BoxStream<'static, PsiCashResult> {
    switch_map(actions, move |connection_state| {
        let request = VideoRequest {
            connection_state,
            custom_data: reward.rewarded_video_custom_data(),
        };
        let ads = ads.clone();
        debug!(
            "Loading rewarded video via {} ({})",
            ads.name(),
            connection_state.label()
        );

        let events = offload_stream(event_buffer, move |sender| async move {
            ads.load_video(request, sender).await
        })
        .map(|event| event.map(video_result))
        .inspect(|event| {
            debug!("Video lane event: {:?}", event);
            log_failure("LoadVideoAd", event);
        });

        catch(
            append_on_complete(prepend(Ok(VideoResult::Loading), events), VideoResult::Finished),
            VideoResult::Failure,
        )
        .map(PsiCashResult::from)
        .boxed()
    })
    .boxed()
}

/// `InFlight`, then the outcome of one balance-returning call.
fn balance_call<F>(lane: &'static str, call: F) -> BoxStream<'static, PsiCashResult>
where
    F: Future<Output = Result<Balance, ClientError>> + Send + 'static,
{
    let outcome = stream::once(async move { offload(call).await.and_then(|balance| balance) })
        .map(|outcome| outcome.map(GetPsiCashResult::Success))
        .inspect(move |outcome| log_failure(lane, outcome));

    prepend(GetPsiCashResult::InFlight, catch(outcome, GetPsiCashResult::Failure))
        .map(PsiCashResult::from)
        .boxed()
}

fn purchase_result(outcome: PurchaseOutcome) -> PsiCashResult {
    match outcome {
        PurchaseOutcome::Expiring(purchase) => ExpiringPurchaseResult::Success(purchase).into(),
        PurchaseOutcome::Balance(balance) => GetPsiCashResult::Success(balance).into(),
    }
}

fn video_result(event: VideoEvent) -> VideoResult {
    match event {
        VideoEvent::Loaded => VideoResult::Loaded,
        VideoEvent::Playing => VideoResult::Playing,
        VideoEvent::Reward(amount) => VideoResult::RewardSuccess(amount),
    }
}

fn log_failure<T>(lane: &str, outcome: &Result<T, ClientError>) {
    if let Err(e) = outcome {
        info!("{lane} failed: {e}");
    }
}
