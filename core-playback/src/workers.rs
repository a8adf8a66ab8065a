//! # Background Workers
//!
//! Tasks spawned by the playback coordinator:
//!
//! - **buffer wait**: polls until enough of a partially downloaded current
//!   track is on disk, then starts it
//! - **successor check**: polls until the successor's file is complete, then
//!   pre-stages it for gapless handoff
//! - **position sampler**: copies the backend position into a cached value
//!   while playing
//! - **event pump**: routes player, streaming SDK and download notices into
//!   the coordinator
//!
//! Workers never touch session state directly. Each tick re-enters the
//! coordinator through its locked methods and holds only a weak reference, so
//! dropping the coordinator ends every worker. A tick that finds its token
//! cancelled after acquiring the lock does nothing.

use crate::coordinator::Inner;
use bridge_traits::{PlayerEvent, StreamingEvent};
use core_download::FetchNotice;
use futures::future::BoxFuture;
use futures::FutureExt;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::mpsc::UnboundedReceiver;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

/// One poll of a worker. Returns `true` once the worker is finished.
type Tick = fn(Arc<Inner>, CancellationToken) -> BoxFuture<'static, bool>;

fn spawn_poll(inner: &Arc<Inner>, name: &'static str, first: Duration, every: Duration, tick: Tick) -> CancellationToken {
    let token = CancellationToken::new();
    let cancel = token.clone();
    let weak: Weak<Inner> = Arc::downgrade(inner);

    tokio::spawn(async move {
        let mut delay = first;
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = time::sleep(delay) => {}
            }
            delay = every;

            let Some(inner) = weak.upgrade() else {
                break;
            };
            if tick(inner, cancel.clone()).await {
                break;
            }
        }
        cancel.cancel();
        trace!(worker = name, "Worker finished");
    });

    token
}

/// Wait for the current track to be buffered.
pub(crate) fn spawn_buffer_wait(inner: &Arc<Inner>) -> CancellationToken {
    let every = inner.config.buffer_poll_interval;
    spawn_poll(inner, "buffer", every, every, |inner, token| {
        async move { inner.buffer_tick(&token).await }.boxed()
    })
}

/// Wait for the successor's file and stage it.
pub(crate) fn spawn_successor_check(inner: &Arc<Inner>) -> CancellationToken {
    let first = inner.config.successor_initial_delay;
    let every = inner.config.successor_poll_interval;
    spawn_poll(inner, "successor", first, every, |inner, token| {
        async move { inner.successor_tick(&token).await }.boxed()
    })
}

/// Sample the playback position while playing.
pub(crate) fn spawn_position_sampler(inner: &Arc<Inner>) -> CancellationToken {
    let every = inner.config.position_poll_interval;
    spawn_poll(inner, "position", every, every, |inner, _token| {
        async move {
            inner.sample_position().await;
            false
        }
        .boxed()
    })
}

/// Receivers drained by the event pump.
pub(crate) struct EventChannels {
    pub player: UnboundedReceiver<PlayerEvent>,
    pub streaming: UnboundedReceiver<StreamingEvent>,
    pub fetch: UnboundedReceiver<FetchNotice>,
}

/// Route collaborator notifications into the coordinator until `shutdown`.
pub(crate) fn spawn_event_pump(inner: &Arc<Inner>, channels: EventChannels, shutdown: CancellationToken) {
    let weak = Arc::downgrade(inner);
    let EventChannels {
        mut player,
        mut streaming,
        mut fetch,
    } = channels;

    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                Some(event) = player.recv() => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.on_player_event(event).await;
                }
                Some(event) = streaming.recv() => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.on_streaming_event(event).await;
                }
                Some(notice) = fetch.recv() => {
                    let Some(inner) = weak.upgrade() else { break };
                    inner.on_fetch_notice(notice).await;
                }
                else => break,
            }
        }
        debug!("Event pump stopped");
    });
}
