//! Recording Channel (C10): the `Lifecycle`-driven runner that owns the
//! directory layout and supervises the segmenter/mover/deleter trio for
//! one named channel (§4.7).
//!
//! Teardown is strictly ordered -- segmenter, then deleter, then mover --
//! matching the original's `doRun` close sequence exactly.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use lifecycle::{Lifecycle, Runner};
use tokio::sync::{oneshot, Mutex};
use tracing::info;
use uuid::Uuid;

use crate::config::ChannelConfig;
use crate::error::ChannelError;
use crate::{deleter, mover, segmenter};

struct ChannelRunner {
    config: ChannelConfig,
    stop_txs: Mutex<Option<StopSenders>>,
}

struct StopSenders {
    segmenter: oneshot::Sender<()>,
    mover: oneshot::Sender<()>,
    deleter: oneshot::Sender<()>,
}

#[async_trait]
impl Runner for ChannelRunner {
    /// Ensures the channel's `<data>/.tmp` tree exists and folds any
    /// files a previous run left in `.tmp/` into the archive before the
    /// segmenter starts writing new ones (§4.7 original `doStart`).
    async fn do_start(&self) -> anyhow::Result<()> {
        let data_dir = self.config.data_dir();
        let tmp_dir = self.config.tmp_dir();
        tokio::fs::create_dir_all(&tmp_dir).await?;
        mover::run_once(&self.config, &data_dir, &tmp_dir).await;
        Ok(())
    }

    async fn do_run(&self) -> anyhow::Result<()> {
        let data_dir = self.config.data_dir();
        let tmp_dir = self.config.tmp_dir();

        let (seg_tx, seg_rx) = oneshot::channel();
        let (mover_tx, mover_rx) = oneshot::channel();
        let (deleter_tx, deleter_rx) = oneshot::channel();
        *self.stop_txs.lock().await = Some(StopSenders {
            segmenter: seg_tx,
            mover: mover_tx,
            deleter: deleter_tx,
        });

        let seg_config = self.config.clone();
        let seg_tmp = tmp_dir.clone();
        let segmenter_task = tokio::spawn(async move {
            segmenter::run(&seg_config, &seg_tmp, seg_rx).await;
        });

        let mover_config = self.config.clone();
        let mover_data = data_dir.clone();
        let mover_tmp = tmp_dir.clone();
        let mover_task = tokio::spawn(async move {
            mover::run(&mover_config, &mover_data, &mover_tmp, mover_rx).await;
        });

        let deleter_config = self.config.clone();
        let deleter_data = data_dir.clone();
        let deleter_task = tokio::spawn(async move {
            deleter::run(&deleter_config, &deleter_data, deleter_rx).await;
        });

        // doRun blocks until doClose signals a close; the three tasks
        // above run until their own stop channel fires.
        let _ = segmenter_task.await;
        let _ = deleter_task.await;
        let _ = mover_task.await;
        Ok(())
    }

    /// Fires the three stop channels in the order §4.7 mandates:
    /// segmenter before deleter before mover. `do_run`'s own joins (in
    /// that same order) are what actually blocks until each has
    /// finished.
    async fn do_close(&self) -> anyhow::Result<()> {
        if let Some(stops) = self.stop_txs.lock().await.take() {
            let _ = stops.segmenter.send(());
            let _ = stops.deleter.send(());
            let _ = stops.mover.send(());
        }
        Ok(())
    }
}

/// One recording channel, identified by a process-unique UUID (§9 Open
/// Question 3: channels are keyed by UUID only, not by name as well --
/// see DESIGN.md).
pub struct Channel {
    pub uuid: Uuid,
    config: ChannelConfig,
    lifecycle: Lifecycle<ChannelRunner>,
    destroyed: AtomicBool,
}

impl Channel {
    pub fn new(config: ChannelConfig) -> Arc<Self> {
        let uuid = Uuid::new_v4();
        let runner = ChannelRunner {
            config: config.clone(),
            stop_txs: Mutex::new(None),
        };
        Arc::new(Self {
            uuid,
            config,
            lifecycle: Lifecycle::new(uuid.to_string(), runner),
            destroyed: AtomicBool::new(false),
        })
    }

    pub fn name(&self) -> &str {
        &self.config.name
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    pub fn transport(&self) -> &str {
        &self.config.transport
    }

    pub fn cover_minutes(&self) -> u64 {
        self.config.cover_minutes
    }

    pub async fn state(&self) -> lifecycle::State {
        self.lifecycle.state().await
    }

    /// `Start()` (§4.7): refused once the channel has been destroyed,
    /// mirroring the original's `startChecker`.
    pub async fn start(&self) -> Result<(), ChannelError> {
        if self.destroyed.load(Ordering::SeqCst) {
            return Err(ChannelError::Destroyed(self.uuid.to_string()));
        }
        self.lifecycle
            .start()
            .await
            .map_err(|e| ChannelError::from_lifecycle(&self.uuid.to_string(), e))
    }

    pub async fn close(&self) -> Result<(), ChannelError> {
        self.lifecycle
            .close_wait()
            .await
            .map_err(|e| ChannelError::from_lifecycle(&self.uuid.to_string(), e))?;
        Ok(())
    }

    /// `Destroy()` (§4.7): close the channel (waiting for teardown) and
    /// mark it so a later `Start` is refused.
    pub async fn destroy(&self) -> Result<(), ChannelError> {
        self.destroyed.store(true, Ordering::SeqCst);
        if self.lifecycle.state().await.is_running() {
            self.close().await?;
        }
        info!(channel = %self.uuid, "channel destroyed");
        Ok(())
    }
}
