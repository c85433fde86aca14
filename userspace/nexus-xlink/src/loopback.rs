// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-process transport and processor emulation for host-based testing
//!
//! OWNERS: @runtime
//!
//! PUBLIC API:
//!   - loopback_link(): Create two connected link ends sharing per-channel queues
//!   - struct LinkEnd: Transport implementation for one side of the link
//!   - struct SimulatedProcessor: BootControl implementation with scripted outcomes
//!   - struct SimulatedDevice: Remote side of a simulated device (link end + processor)
//!
//! INVARIANTS:
//!   - Packet boundaries are preserved for read_packet
//!   - Bytes in flight per direction never exceed the writer's data size
//!   - Closing an end wakes every waiter on that channel
//!   - Nothing is queued toward an end that closed and has not reopened
//!
//! ERROR CONDITIONS:
//!   - Error::ChannelClosed: local end not open, closed while waiting, or
//!     peer closed since it last opened
//!   - Error::AlreadyOpen: local end already open
//!   - Error::Timeout / Error::WouldBlock: deadline expired without progress
//!   - Error::CommunicationFail: scripted boot failure
//!
//! DEPENDENCIES:
//!   - parking_lot::{Mutex, Condvar}: lane state and wakeups
//!
//! TEST SCENARIOS:
//!   - Roundtrip in both directions
//!   - Partial writes under back-pressure
//!   - Close wakes blocked readers
//!   - Purge drops both directions without closing either end
//!   - Scripted boot outcomes

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use log::debug;
use parking_lot::{Condvar, Mutex};
use xlink_abi::{ChannelId, PACKET_QUEUE_CAPACITY};

use crate::{BootControl, Deadline, DeviceConfig, Error, Result, Transport, Wait};

/// Queue limits shared by both ends of a link.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct LinkLimits {
    /// Packets that may wait in one direction of a channel.
    pub max_packets: usize,
}

impl Default for LinkLimits {
    fn default() -> Self {
        Self { max_packets: PACKET_QUEUE_CAPACITY }
    }
}

/// Creates two connected link ends with default limits.
pub fn loopback_link() -> (LinkEnd, LinkEnd) {
    loopback_link_with(LinkLimits::default())
}

/// Creates two connected link ends.
pub fn loopback_link_with(limits: LinkLimits) -> (LinkEnd, LinkEnd) {
    let link = Arc::new(Link { pipes: Mutex::new(HashMap::new()), limits });
    (LinkEnd { side: 0, link: Arc::clone(&link) }, LinkEnd { side: 1, link })
}

struct Link {
    pipes: Mutex<HashMap<ChannelId, Arc<Pipe>>>,
    limits: LinkLimits,
}

#[derive(Default)]
struct Pipe {
    lanes: Mutex<[Lane; 2]>,
    cond: Condvar,
}

/// State of one end of a channel plus the data queued toward it.
#[derive(Default)]
struct Lane {
    open: bool,
    epoch: u64,
    data_size: usize,
    inbox: VecDeque<Vec<u8>>,
    queued: usize,
}

impl Lane {
    /// Closed after having been open at least once.
    fn closed(&self) -> bool {
        !self.open && self.epoch > 0
    }
}

/// One side of a loopback link.
#[derive(Clone)]
pub struct LinkEnd {
    side: usize,
    link: Arc<Link>,
}

impl LinkEnd {
    fn pipe(&self, chan: ChannelId) -> Arc<Pipe> {
        let mut pipes = self.link.pipes.lock();
        Arc::clone(pipes.entry(chan).or_default())
    }

    fn peer(&self) -> usize {
        1 - self.side
    }

    /// Returns true when this end of `chan` is open.
    pub fn is_open(&self, chan: ChannelId) -> bool {
        self.pipe(chan).lanes.lock()[self.side].open
    }

    /// Bytes queued toward this end of `chan`.
    pub fn queued(&self, chan: ChannelId) -> usize {
        self.pipe(chan).lanes.lock()[self.side].queued
    }
}

impl Transport for LinkEnd {
    fn open(&self, chan: ChannelId, data_size: u32) -> Result<()> {
        let pipe = self.pipe(chan);
        let mut lanes = pipe.lanes.lock();
        let lane = &mut lanes[self.side];
        if lane.open {
            return Err(Error::AlreadyOpen);
        }
        lane.open = true;
        lane.data_size = data_size as usize;
        pipe.cond.notify_all();
        Ok(())
    }

    fn close(&self, chan: ChannelId) -> Result<()> {
        let pipe = self.pipe(chan);
        let mut lanes = pipe.lanes.lock();
        let lane = &mut lanes[self.side];
        if !lane.open {
            return Err(Error::ChannelClosed);
        }
        if lane.queued > 0 {
            debug!("loopback: chan {chan} closed with {} bytes undelivered", lane.queued);
        }
        lane.open = false;
        lane.epoch = lane.epoch.wrapping_add(1);
        lane.inbox.clear();
        lane.queued = 0;
        pipe.cond.notify_all();
        Ok(())
    }

    fn is_peer_open(&self, chan: ChannelId) -> bool {
        self.pipe(chan).lanes.lock()[self.peer()].open
    }

    fn purge(&self, chan: ChannelId) {
        let pipe = self.pipe(chan);
        let mut lanes = pipe.lanes.lock();
        for lane in lanes.iter_mut() {
            if lane.queued > 0 {
                debug!("loopback: chan {chan} purged {} bytes", lane.queued);
            }
            lane.inbox.clear();
            lane.queued = 0;
        }
        pipe.cond.notify_all();
    }

    fn write(&self, chan: ChannelId, data: &[u8], deadline: &Deadline) -> Result<usize> {
        let (me, peer) = (self.side, self.peer());
        let pipe = self.pipe(chan);
        let mut lanes = pipe.lanes.lock();
        let epoch = lanes[me].epoch;
        loop {
            if !lanes[me].open || lanes[me].epoch != epoch || lanes[peer].closed() {
                return Err(Error::ChannelClosed);
            }
            if data.is_empty() {
                return Ok(0);
            }
            let free = lanes[me].data_size.saturating_sub(lanes[peer].queued);
            if free > 0 && lanes[peer].inbox.len() < self.link.limits.max_packets {
                let accepted = free.min(data.len());
                lanes[peer].inbox.push_back(data[..accepted].to_vec());
                lanes[peer].queued += accepted;
                pipe.cond.notify_all();
                return Ok(accepted);
            }
            if !deadline.wait_on(&pipe.cond, &mut lanes) {
                return Err(deadline.expiry_error());
            }
        }
    }

    fn write_packet(&self, chan: ChannelId, data: &[u8], deadline: &Deadline) -> Result<()> {
        let (me, peer) = (self.side, self.peer());
        let pipe = self.pipe(chan);
        let mut lanes = pipe.lanes.lock();
        let epoch = lanes[me].epoch;
        loop {
            if !lanes[me].open || lanes[me].epoch != epoch || lanes[peer].closed() {
                return Err(Error::ChannelClosed);
            }
            if data.is_empty() {
                return Ok(());
            }
            if data.len() > lanes[me].data_size {
                return Err(Error::InvalidArgument("packet exceeds channel data size"));
            }
            let free = lanes[me].data_size.saturating_sub(lanes[peer].queued);
            if free >= data.len() && lanes[peer].inbox.len() < self.link.limits.max_packets {
                lanes[peer].inbox.push_back(data.to_vec());
                lanes[peer].queued += data.len();
                pipe.cond.notify_all();
                return Ok(());
            }
            if !deadline.wait_on(&pipe.cond, &mut lanes) {
                return Err(deadline.expiry_error());
            }
        }
    }

    fn read(&self, chan: ChannelId, buf: &mut [u8], deadline: &Deadline) -> Result<usize> {
        let me = self.side;
        let pipe = self.pipe(chan);
        let mut lanes = pipe.lanes.lock();
        let epoch = lanes[me].epoch;
        loop {
            let lane = &mut lanes[me];
            if !lane.open || lane.epoch != epoch {
                return Err(Error::ChannelClosed);
            }
            if buf.is_empty() {
                return Ok(0);
            }
            if let Some(front) = lane.inbox.front_mut() {
                let copied = front.len().min(buf.len());
                buf[..copied].copy_from_slice(&front[..copied]);
                if copied == front.len() {
                    lane.inbox.pop_front();
                } else {
                    front.drain(..copied);
                }
                lane.queued -= copied;
                pipe.cond.notify_all();
                return Ok(copied);
            }
            if !deadline.wait_on(&pipe.cond, &mut lanes) {
                return Err(deadline.expiry_error());
            }
        }
    }

    fn read_packet(&self, chan: ChannelId, deadline: &Deadline) -> Result<Vec<u8>> {
        let me = self.side;
        let pipe = self.pipe(chan);
        let mut lanes = pipe.lanes.lock();
        let epoch = lanes[me].epoch;
        loop {
            let lane = &mut lanes[me];
            if !lane.open || lane.epoch != epoch {
                return Err(Error::ChannelClosed);
            }
            if let Some(packet) = lane.inbox.pop_front() {
                lane.queued -= packet.len();
                pipe.cond.notify_all();
                return Ok(packet);
            }
            if !deadline.wait_on(&pipe.cond, &mut lanes) {
                return Err(deadline.expiry_error());
            }
        }
    }
}

/// Scripted outcome of [`SimulatedProcessor::start`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum BootBehaviour {
    /// Starts and reports ready immediately.
    #[default]
    Normal,
    /// Rejects the start request.
    FailStart,
    /// Starts but never reports ready.
    NeverReady,
}

#[derive(Default)]
struct ProcessorState {
    behaviour: BootBehaviour,
    running: bool,
    ready: bool,
    starts: u32,
    image_len: usize,
}

/// Remote processor emulation driven by [`BootControl`].
#[derive(Default)]
pub struct SimulatedProcessor {
    state: Mutex<ProcessorState>,
    ready: Condvar,
}

impl SimulatedProcessor {
    /// Creates a processor that boots normally.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a processor with the given boot outcome.
    pub fn with_behaviour(behaviour: BootBehaviour) -> Self {
        let processor = Self::default();
        processor.set_behaviour(behaviour);
        processor
    }

    /// Changes the outcome of later start requests.
    pub fn set_behaviour(&self, behaviour: BootBehaviour) {
        self.state.lock().behaviour = behaviour;
    }

    /// Returns true between a successful start and the next stop.
    pub fn is_running(&self) -> bool {
        self.state.lock().running
    }

    /// Number of accepted start requests.
    pub fn start_count(&self) -> u32 {
        self.state.lock().starts
    }

    /// Size of the most recently started image.
    pub fn image_len(&self) -> usize {
        self.state.lock().image_len
    }
}

impl BootControl for SimulatedProcessor {
    fn start(&self, firmware: &[u8]) -> Result<()> {
        let mut state = self.state.lock();
        if state.behaviour == BootBehaviour::FailStart {
            return Err(Error::CommunicationFail);
        }
        state.running = true;
        state.starts += 1;
        state.image_len = firmware.len();
        state.ready = state.behaviour == BootBehaviour::Normal;
        if state.ready {
            self.ready.notify_all();
        }
        Ok(())
    }

    fn wait_for_ready(&self, timeout: Duration) -> Result<()> {
        let deadline = Deadline::new(Wait::Timeout(timeout));
        let mut state = self.state.lock();
        loop {
            if state.ready {
                return Ok(());
            }
            if !deadline.wait_on(&self.ready, &mut state) {
                return Err(Error::Timeout);
            }
        }
    }

    fn stop(&self) -> Result<()> {
        let mut state = self.state.lock();
        state.running = false;
        state.ready = false;
        Ok(())
    }
}

/// Remote side of a simulated device: the far link end and its processor.
pub struct SimulatedDevice {
    /// Configuration the device was created from.
    pub config: DeviceConfig,
    /// Link end owned by the remote firmware.
    pub remote: LinkEnd,
    /// Processor driven by boot and reset.
    pub processor: Arc<SimulatedProcessor>,
}

impl SimulatedDevice {
    /// Creates a device; returns the host link end alongside the remote side.
    pub fn new(config: DeviceConfig) -> (LinkEnd, Self) {
        let (host, remote) = loopback_link();
        (host, Self { config, remote, processor: Arc::new(SimulatedProcessor::new()) })
    }
}
