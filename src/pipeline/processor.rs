//! # Action Processor
//!
//! Turns one stream of incoming actions into one stream of results.
//!
//! ```text
//!                        ┌──▶ ClearErrorState ──────┐
//!                        ├──▶ GetPsiCashRemote ─────┤
//! actions ──▶ Dispatcher ├──▶ GetPsiCashLocal ──────┤
//!   (read once)    │     ├──▶ MakeExpiringPurchase ─┼──▶ LaneMerge ──▶ results
//!                  │     ├──▶ RemovePurchases ──────┤        ▲            │
//!                  │     └──▶ LoadVideoAd ──────────┘        │            └──▶ Notifier
//!                  └──── unknown tag ──▶ held error ─────────┘
//! ```
//!
//! The dispatcher reads the action stream exactly once and hands each action
//! to its lane over an unbounded channel. It is also the catch-all lane: an
//! unrecognized tag closes every lane's input and becomes the one error that
//! ends the results. The error is held back until the lanes have emitted
//! everything the actions before it already produced.
//!
//! Nothing runs until the result stream is polled, and dropping it cancels
//! every lane along with whatever collaborator calls they have in flight.

use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};

use futures::channel::mpsc::{UnboundedReceiver, UnboundedSender, unbounded};
use futures::stream::{BoxStream, Stream, StreamExt};
use log::{debug, info, warn};

use crate::client::{AdClient, RewardClient};
use crate::core::action::{Action, IncomingAction};
use crate::core::model::ConnectionState;
use crate::core::notifier::{Notifier, notify};
use crate::core::result::{PipelineError, PsiCashResult};
use crate::pipeline::combinators::merge;
use crate::pipeline::lanes::{self, PurchaseRequest};

/// Default capacity of the channel between the ad SDK and the video lane.
pub const DEFAULT_VIDEO_EVENT_BUFFER: usize = 16;

/// Actions routed per poll before the dispatcher yields to the lanes.
const ROUTE_BUDGET: usize = 32;

/// Merged output: results, or a single terminal `PipelineError`.
pub type ResultStream = BoxStream<'static, Result<PsiCashResult, PipelineError>>;

pub struct ActionProcessor {
    reward: Arc<dyn RewardClient>,
    ads: Arc<dyn AdClient>,
    notifier: Arc<dyn Notifier>,
    video_event_buffer: usize,
}

impl ActionProcessor {
    pub fn new(
        reward: Arc<dyn RewardClient>,
        ads: Arc<dyn AdClient>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            reward,
            ads,
            notifier,
            video_event_buffer: DEFAULT_VIDEO_EVENT_BUFFER,
        }
    }

    pub fn with_video_event_buffer(mut self, video_event_buffer: usize) -> Self {
        self.video_event_buffer = video_event_buffer;
        self
    }

    /// Wires a fresh set of lanes onto `actions`.
    ///
    /// Known actions only ever produce `Ok` items; the stream ends with an
    /// `Err` only for an unrecognized action, and nothing follows that error.
    pub fn process<S>(&self, actions: S) -> ResultStream
    where
        S: Stream<Item = IncomingAction> + Send + 'static,
    {
        let (senders, receivers) = lane_channels();
        let dispatcher = Dispatcher {
            actions: actions.boxed(),
            lanes: Some(senders),
            routed: 0,
        };

        let lane_outputs = vec![
            lanes::clear_error_state(receivers.clear_error_state.boxed()),
            lanes::get_psicash_remote(receivers.get_psicash_remote.boxed(), self.reward.clone()),
            lanes::get_psicash_local(receivers.get_psicash_local.boxed(), self.reward.clone()),
            lanes::make_expiring_purchase(
                receivers.make_expiring_purchase.boxed(),
                self.reward.clone(),
            ),
            lanes::remove_purchases(receivers.remove_purchases.boxed(), self.reward.clone()),
            lanes::load_video_ad(
                receivers.load_video_ad.boxed(),
                self.reward.clone(),
                self.ads.clone(),
                self.video_event_buffer,
            ),
        ];

        info!("Action pipeline wired ({} lanes)", lane_outputs.len());

        let notifier = self.notifier.clone();
        LaneMerge {
            dispatcher,
            dispatcher_done: false,
            lanes: merge(lane_outputs),
            lanes_done: false,
            pending_error: None,
            failed: false,
        }
        .inspect(move |item| {
            if let Ok(result) = item {
                notify(notifier.as_ref(), result);
            }
        })
        .boxed()
    }
}

struct LaneSenders {
    clear_error_state: UnboundedSender<()>,
    get_psicash_remote: UnboundedSender<ConnectionState>,
    get_psicash_local: UnboundedSender<()>,
    make_expiring_purchase: UnboundedSender<PurchaseRequest>,
    remove_purchases: UnboundedSender<Vec<String>>,
    load_video_ad: UnboundedSender<ConnectionState>,
}

struct LaneReceivers {
    clear_error_state: UnboundedReceiver<()>,
    get_psicash_remote: UnboundedReceiver<ConnectionState>,
    get_psicash_local: UnboundedReceiver<()>,
    make_expiring_purchase: UnboundedReceiver<PurchaseRequest>,
    remove_purchases: UnboundedReceiver<Vec<String>>,
    load_video_ad: UnboundedReceiver<ConnectionState>,
}

fn lane_channels() -> (LaneSenders, LaneReceivers) {
    let (clear_error_state_tx, clear_error_state_rx) = unbounded();
    let (get_psicash_remote_tx, get_psicash_remote_rx) = unbounded();
    let (get_psicash_local_tx, get_psicash_local_rx) = unbounded();
    let (make_expiring_purchase_tx, make_expiring_purchase_rx) = unbounded();
    let (remove_purchases_tx, remove_purchases_rx) = unbounded();
    let (load_video_ad_tx, load_video_ad_rx) = unbounded();

    (
        LaneSenders {
            clear_error_state: clear_error_state_tx,
            get_psicash_remote: get_psicash_remote_tx,
            get_psicash_local: get_psicash_local_tx,
            make_expiring_purchase: make_expiring_purchase_tx,
            remove_purchases: remove_purchases_tx,
            load_video_ad: load_video_ad_tx,
        },
        LaneReceivers {
            clear_error_state: clear_error_state_rx,
            get_psicash_remote: get_psicash_remote_rx,
            get_psicash_local: get_psicash_local_rx,
            make_expiring_purchase: make_expiring_purchase_rx,
            remove_purchases: remove_purchases_rx,
            load_video_ad: load_video_ad_rx,
        },
    )
}

/// Reads the action stream and feeds the lanes. Yields nothing but the
/// unknown-action error. `lanes` is `None` once the action stream has ended
/// or an unknown action arrived, which closes every lane's input.
struct Dispatcher {
    actions: BoxStream<'static, IncomingAction>,
    lanes: Option<LaneSenders>,
    routed: usize,
}

impl Dispatcher {
    fn route(&mut self, action: Action) {
        let Some(lanes) = self.lanes.as_ref() else {
            return;
        };
        let tag = action.tag();
        debug!("Routing action #{}: {}", self.routed, tag);

        let delivered = match action {
            Action::ClearErrorState => lanes.clear_error_state.unbounded_send(()).is_ok(),
            Action::GetPsiCashRemote { connection_state } => lanes
                .get_psicash_remote
                .unbounded_send(connection_state)
                .is_ok(),
            Action::GetPsiCashLocal => lanes.get_psicash_local.unbounded_send(()).is_ok(),
            Action::MakeExpiringPurchase {
                connection_state,
                price,
                has_active_boost,
            } => lanes
                .make_expiring_purchase
                .unbounded_send(PurchaseRequest {
                    connection_state,
                    price,
                    has_active_boost,
                })
                .is_ok(),
            Action::RemovePurchases { purchases } => {
                lanes.remove_purchases.unbounded_send(purchases).is_ok()
            }
            Action::LoadVideoAd { connection_state } => {
                debug!("LoadVideoAd supersedes any video load still in flight");
                lanes.load_video_ad.unbounded_send(connection_state).is_ok()
            }
        };

        if !delivered {
            warn!("{tag} dropped: lane closed");
        }
        self.routed += 1;
    }
}

impl Stream for Dispatcher {
    type Item = PipelineError;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.lanes.is_none() {
            return Poll::Ready(None);
        }

        for _ in 0..ROUTE_BUDGET {
            match this.actions.poll_next_unpin(cx) {
                Poll::Ready(Some(IncomingAction::Known(action))) => this.route(action),
                Poll::Ready(Some(IncomingAction::Unrecognized(tag))) => {
                    warn!("Unknown action: {tag}");
                    this.lanes = None;
                    return Poll::Ready(Some(PipelineError::UnknownAction(tag)));
                }
                Poll::Ready(None) => {
                    debug!(
                        "Action stream ended after {} actions; draining lanes",
                        this.routed
                    );
                    this.lanes = None;
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }

        // Budget spent with input still ready: let the lanes run, then resume.
        cx.waker().wake_by_ref();
        Poll::Pending
    }
}

impl Drop for Dispatcher {
    fn drop(&mut self) {
        debug!("Action pipeline disposed after {} actions", self.routed);
    }
}

/// Interleaves lane results with the dispatcher's error.
///
/// The dispatcher is polled first so routed actions reach their lanes, then
/// the lanes. A held error is released only once the lanes have nothing ready,
/// so results of actions routed before the unknown one come out ahead of it.
/// Nothing is yielded after the error.
struct LaneMerge {
    dispatcher: Dispatcher,
    dispatcher_done: bool,
    lanes: BoxStream<'static, PsiCashResult>,
    lanes_done: bool,
    pending_error: Option<PipelineError>,
    failed: bool,
}

impl Stream for LaneMerge {
    type Item = Result<PsiCashResult, PipelineError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();
        if this.failed {
            return Poll::Ready(None);
        }

        if !this.dispatcher_done {
            match this.dispatcher.poll_next_unpin(cx) {
                Poll::Ready(Some(err)) => {
                    this.pending_error = Some(err);
                    this.dispatcher_done = true;
                }
                Poll::Ready(None) => this.dispatcher_done = true,
                Poll::Pending => {}
            }
        }

        if !this.lanes_done {
            match this.lanes.poll_next_unpin(cx) {
                Poll::Ready(Some(result)) => return Poll::Ready(Some(Ok(result))),
                Poll::Ready(None) => this.lanes_done = true,
                Poll::Pending => {}
            }
        }

        if let Some(err) = this.pending_error.take() {
            this.failed = true;
            return Poll::Ready(Some(Err(err)));
        }

        if this.dispatcher_done && this.lanes_done {
            Poll::Ready(None)
        } else {
            Poll::Pending
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    use futures::stream;

    use crate::client::ClientError;
    use crate::core::model::{Balance, PurchaseOutcome, VideoEvent};
    use crate::core::notifier::Notification;
    use crate::core::result::{
        ClearErrorStateResult, ExpiringPurchaseResult, GetPsiCashResult, VideoResult,
    };
    use crate::test_support::{
        AdStep, StubAdClient, StubRewardClient, boost_price, expiring_purchase, test_processor,
        wait_until,
    };

    fn connected() -> ConnectionState {
        ConnectionState::Connected
    }

    fn remote() -> IncomingAction {
        Action::GetPsiCashRemote {
            connection_state: connected(),
        }
        .into()
    }

    fn video() -> IncomingAction {
        Action::LoadVideoAd {
            connection_state: connected(),
        }
        .into()
    }

    fn purchase() -> IncomingAction {
        Action::MakeExpiringPurchase {
            connection_state: connected(),
            price: boost_price(10),
            has_active_boost: false,
        }
        .into()
    }

    async fn run(
        processor: &ActionProcessor,
        actions: Vec<IncomingAction>,
    ) -> Vec<Result<PsiCashResult, PipelineError>> {
        processor.process(stream::iter(actions)).collect().await
    }

    fn ok(results: Vec<Result<PsiCashResult, PipelineError>>) -> Vec<PsiCashResult> {
        results
            .into_iter()
            .map(|r| r.expect("known actions never end the stream with an error"))
            .collect()
    }

    #[tokio::test]
    async fn test_clear_error_state() {
        let (processor, _notes) = test_processor(StubRewardClient::new(), StubAdClient::new());
        let results = ok(run(&processor, vec![Action::ClearErrorState.into()]).await);
        assert_eq!(
            results,
            vec![PsiCashResult::ClearErrorState(ClearErrorStateResult::Success)]
        );
    }

    #[tokio::test]
    async fn test_get_psicash_remote_success() {
        let reward = StubRewardClient::new().with_balance(Ok(Balance {
            balance: 500,
            purchases: vec![],
        }));
        let (processor, _notes) = test_processor(reward, StubAdClient::new());
        let results = ok(run(&processor, vec![remote()]).await);
        assert_eq!(
            results,
            vec![
                PsiCashResult::from(GetPsiCashResult::InFlight),
                GetPsiCashResult::Success(Balance {
                    balance: 500,
                    purchases: vec![]
                })
                .into(),
            ]
        );
    }

    #[tokio::test]
    async fn test_get_psicash_remote_failure_is_a_value() {
        let err = ClientError::Server {
            status: 503,
            message: "maintenance".into(),
        };
        let reward = StubRewardClient::new().with_balance(Err(err.clone()));
        let (processor, _notes) = test_processor(reward, StubAdClient::new());
        let results = ok(run(&processor, vec![remote()]).await);
        assert_eq!(
            results,
            vec![
                PsiCashResult::from(GetPsiCashResult::InFlight),
                GetPsiCashResult::Failure(err).into()
            ]
        );
    }

    #[tokio::test]
    async fn test_get_psicash_local_and_remove_purchases() {
        let reward = StubRewardClient::new();
        let (processor, _notes) = test_processor(reward.clone(), StubAdClient::new());

        let local = ok(run(&processor, vec![Action::GetPsiCashLocal.into()]).await);
        assert_eq!(local.len(), 2);
        assert_eq!(local[0], GetPsiCashResult::InFlight.into());
        assert!(matches!(
            local[1],
            PsiCashResult::GetPsiCash(GetPsiCashResult::Success(_))
        ));

        let removed = ok(run(
            &processor,
            vec![
                Action::RemovePurchases {
                    purchases: vec!["p-1".into()],
                }
                .into(),
            ],
        )
        .await);
        assert_eq!(removed.len(), 2);
        assert!(removed[1].is_terminal());
        assert_eq!(*reward.removed_ids.lock().unwrap(), vec!["p-1".to_string()]);
    }

    #[tokio::test]
    async fn test_purchase_expiring_notifies_once() {
        let reward = StubRewardClient::new()
            .with_purchase(Ok(PurchaseOutcome::Expiring(expiring_purchase("p-9"))));
        let (processor, mut notes) = test_processor(reward, StubAdClient::new());

        let results = ok(run(&processor, vec![purchase()]).await);
        assert_eq!(
            results,
            vec![
                PsiCashResult::from(ExpiringPurchaseResult::InFlight),
                ExpiringPurchaseResult::Success(expiring_purchase("p-9")).into(),
            ]
        );
        assert_eq!(
            notes.try_recv().unwrap(),
            Notification::NewExpiringPurchase(expiring_purchase("p-9"))
        );
        assert!(notes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_purchase_returning_balance_ends_as_get_psicash_success() {
        let balance = Balance {
            balance: 3,
            purchases: vec![],
        };
        let reward =
            StubRewardClient::new().with_purchase(Ok(PurchaseOutcome::Balance(balance.clone())));
        let (processor, mut notes) = test_processor(reward, StubAdClient::new());

        let results = ok(run(&processor, vec![purchase()]).await);
        assert_eq!(
            results,
            vec![
                PsiCashResult::from(ExpiringPurchaseResult::InFlight),
                GetPsiCashResult::Success(balance).into(),
            ]
        );
        assert!(notes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_purchase_failure() {
        let err = ClientError::InsufficientBalance {
            balance: 1,
            price: 10,
        };
        let reward = StubRewardClient::new().with_purchase(Err(err.clone()));
        let (processor, mut notes) = test_processor(reward, StubAdClient::new());

        let results = ok(run(&processor, vec![purchase()]).await);
        assert_eq!(
            results,
            vec![
                PsiCashResult::from(ExpiringPurchaseResult::InFlight),
                ExpiringPurchaseResult::Failure(err).into(),
            ]
        );
        assert!(notes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_video_runs_to_finished_and_notifies_reward() {
        let ads = StubAdClient::new().with_script(vec![
            AdStep::Emit(VideoEvent::Loaded),
            AdStep::Emit(VideoEvent::Playing),
            AdStep::Emit(VideoEvent::Reward(35)),
        ]);
        let (processor, mut notes) = test_processor(StubRewardClient::new(), ads.clone());

        let results = ok(run(&processor, vec![video()]).await);
        assert_eq!(
            results,
            vec![
                PsiCashResult::from(VideoResult::Loading),
                VideoResult::Loaded.into(),
                VideoResult::Playing.into(),
                VideoResult::RewardSuccess(35).into(),
                VideoResult::Finished.into(),
            ]
        );
        assert_eq!(notes.try_recv().unwrap(), Notification::NewReward(35));
        assert!(notes.try_recv().is_err());
        assert_eq!(
            ads.requests.lock().unwrap()[0].custom_data,
            "stub-custom-data"
        );
    }

    #[tokio::test]
    async fn test_video_failure_replaces_finished() {
        let ads = StubAdClient::new().with_script(vec![AdStep::Fail(ClientError::Network(
            "network down".into(),
        ))]);
        let (processor, _notes) = test_processor(StubRewardClient::new(), ads);

        let results = ok(run(&processor, vec![video()]).await);
        assert_eq!(
            results,
            vec![
                PsiCashResult::from(VideoResult::Loading),
                VideoResult::Failure(ClientError::Network("network down".into())).into(),
            ]
        );
    }

    #[tokio::test]
    async fn test_video_failure_keeps_earlier_events() {
        let ads = StubAdClient::new().with_script(vec![
            AdStep::Emit(VideoEvent::Loaded),
            AdStep::Emit(VideoEvent::Playing),
            AdStep::Fail(ClientError::VideoUnavailable("closed early".into())),
        ]);
        let (processor, mut notes) = test_processor(StubRewardClient::new(), ads);

        let results = ok(run(&processor, vec![video()]).await);
        assert_eq!(
            results,
            vec![
                PsiCashResult::from(VideoResult::Loading),
                VideoResult::Loaded.into(),
                VideoResult::Playing.into(),
                VideoResult::Failure(ClientError::VideoUnavailable("closed early".into())).into(),
            ]
        );
        assert!(notes.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_second_video_load_silences_the_first() {
        let ads = StubAdClient::new()
            .with_script(vec![
                AdStep::Emit(VideoEvent::Loaded),
                AdStep::Hang,
            ])
            .with_script(vec![AdStep::Emit(VideoEvent::Playing)]);
        let (processor, _notes) = test_processor(StubRewardClient::new(), ads.clone());

        let (input, actions) = unbounded();
        let mut results = processor.process(actions);

        input.unbounded_send(video()).unwrap();
        assert_eq!(results.next().await, Some(Ok(VideoResult::Loading.into())));
        assert_eq!(results.next().await, Some(Ok(VideoResult::Loaded.into())));

        input.unbounded_send(video()).unwrap();
        drop(input);
        let rest: Vec<_> = ok(results.collect().await);
        assert_eq!(
            rest,
            vec![
                PsiCashResult::from(VideoResult::Loading),
                VideoResult::Playing.into(),
                VideoResult::Finished.into(),
            ]
        );

        assert!(wait_until(|| ads.cancelled.load(Ordering::SeqCst) == 1).await);
    }

    #[tokio::test]
    async fn test_unknown_action_ends_the_stream() {
        let (processor, _notes) = test_processor(StubRewardClient::new(), StubAdClient::new());
        let results = run(
            &processor,
            vec![
                Action::ClearErrorState.into(),
                IncomingAction::Unrecognized("Foo".into()),
                Action::GetPsiCashLocal.into(),
            ],
        )
        .await;

        let errors: Vec<_> = results.iter().filter(|r| r.is_err()).collect();
        assert_eq!(errors.len(), 1);
        let last = results.last().expect("stream yields the error");
        assert_eq!(last, &Err(PipelineError::UnknownAction("Foo".into())));
        assert_eq!(
            last.as_ref().unwrap_err().to_string(),
            "Unknown action: Foo"
        );
    }

    #[tokio::test]
    async fn test_results_routed_before_unknown_action_come_first() {
        let (processor, _notes) = test_processor(StubRewardClient::new(), StubAdClient::new());
        let results = run(
            &processor,
            vec![
                Action::ClearErrorState.into(),
                Action::GetPsiCashLocal.into(),
                IncomingAction::Unrecognized("Foo".into()),
            ],
        )
        .await;

        let (last, earlier) = results.split_last().expect("stream yields the error");
        assert_eq!(last, &Err(PipelineError::UnknownAction("Foo".into())));
        assert!(earlier.contains(&Ok(PsiCashResult::ClearErrorState(
            ClearErrorStateResult::Success
        ))));
        assert!(earlier.contains(&Ok(GetPsiCashResult::InFlight.into())));
        assert!(earlier.iter().all(|r| r.is_ok()));
    }

    #[tokio::test]
    async fn test_endless_input_does_not_starve_the_lanes() {
        let (processor, _notes) = test_processor(StubRewardClient::new(), StubAdClient::new());
        let results: Vec<_> = processor
            .process(stream::repeat(IncomingAction::from(Action::ClearErrorState)))
            .take(3)
            .collect()
            .await;
        assert_eq!(
            ok(results),
            vec![PsiCashResult::ClearErrorState(ClearErrorStateResult::Success); 3]
        );
    }

    #[tokio::test]
    async fn test_concurrent_remote_fetches_do_not_cancel_each_other() {
        let reward = StubRewardClient::new().gated();
        let (processor, _notes) = test_processor(reward.clone(), StubAdClient::new());

        let (input, actions) = unbounded();
        let results = processor.process(actions);
        let consumer = tokio::spawn(results.collect::<Vec<_>>());

        input.unbounded_send(remote()).unwrap();
        input.unbounded_send(remote()).unwrap();
        // Both calls are parked on the gate at once: neither waited for nor cancelled the other.
        assert!(wait_until(|| reward.remote_calls.load(Ordering::SeqCst) == 2).await);

        reward.release(2);
        drop(input);
        let results = ok(consumer.await.unwrap());
        let in_flight = results
            .iter()
            .filter(|r| **r == PsiCashResult::from(GetPsiCashResult::InFlight))
            .count();
        let succeeded = results
            .iter()
            .filter(|r| matches!(r, PsiCashResult::GetPsiCash(GetPsiCashResult::Success(_))))
            .count();
        assert_eq!((in_flight, succeeded), (2, 2));
        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn test_dropping_results_cancels_in_flight_video() {
        let ads = StubAdClient::new().with_script(vec![AdStep::Hang]);
        let (processor, _notes) = test_processor(StubRewardClient::new(), ads.clone());

        let (input, actions) = unbounded();
        let mut results = processor.process(actions);
        let consumer = tokio::spawn(async move { while results.next().await.is_some() {} });

        input.unbounded_send(video()).unwrap();
        assert!(wait_until(|| ads.started.load(Ordering::SeqCst) == 1).await);

        consumer.abort();
        assert!(wait_until(|| ads.cancelled.load(Ordering::SeqCst) == 1).await);
        drop(input);
    }

    #[tokio::test]
    async fn test_results_end_when_actions_end() {
        let (processor, _notes) = test_processor(StubRewardClient::new(), StubAdClient::new());
        let results = run(&processor, vec![]).await;
        assert!(results.is_empty());
    }
}
