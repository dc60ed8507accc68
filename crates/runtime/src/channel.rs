//! Channel send/recv/close (spec.md §5).
//!
//! The shared ring buffer plus its mutex and two condition variables live in
//! `opo_core::ChannelValue`; the blocking protocol that drives them belongs
//! here, next to the rest of execution semantics.

use opo_core::{ChannelValue, Value};

pub enum SendOutcome {
    Sent,
    ClosedError,
}

/// Blocks while the channel is full and open; enqueues once there is room
/// or the channel is closed (in which case it reports the error instead of
/// sending).
pub fn send(chan: &ChannelValue, value: Value) -> SendOutcome {
    let mut state = chan.state.lock().unwrap();
    loop {
        if state.closed {
            return SendOutcome::ClosedError;
        }
        if state.buffer.len() < chan.capacity {
            state.buffer.push_back(value);
            chan.recv_cond.notify_one();
            return SendOutcome::Sent;
        }
        state = chan.send_cond.wait(state).unwrap();
    }
}

/// Blocks while the channel is empty and open; returns `None` only when the
/// channel is both empty and closed (the language's "receive on a closed,
/// drained channel yields void" rule).
pub fn recv(chan: &ChannelValue) -> Option<Value> {
    let mut state = chan.state.lock().unwrap();
    loop {
        if let Some(v) = state.buffer.pop_front() {
            chan.send_cond.notify_one();
            return Some(v);
        }
        if state.closed {
            return None;
        }
        state = chan.recv_cond.wait(state).unwrap();
    }
}

pub fn close(chan: &ChannelValue) {
    let mut state = chan.state.lock().unwrap();
    state.closed = true;
    drop(state);
    chan.send_cond.notify_all();
    chan.recv_cond.notify_all();
}

#[cfg(test)]
mod tests {
    use super::*;
    use opo_core::ChannelState;
    use std::sync::Mutex;

    fn new_chan(capacity: usize) -> ChannelValue {
        ChannelValue {
            capacity,
            state: Mutex::new(ChannelState { buffer: Default::default(), closed: false }),
            send_cond: std::sync::Condvar::new(),
            recv_cond: std::sync::Condvar::new(),
        }
    }

    #[test]
    fn send_then_recv_round_trips() {
        let chan = new_chan(1);
        assert!(matches!(send(&chan, Value::Int(7)), SendOutcome::Sent));
        assert!(matches!(recv(&chan), Some(Value::Int(7))));
    }

    #[test]
    fn recv_on_closed_empty_channel_returns_none() {
        let chan = new_chan(1);
        close(&chan);
        assert!(recv(&chan).is_none());
    }

    #[test]
    fn send_on_closed_channel_reports_error() {
        let chan = new_chan(1);
        close(&chan);
        assert!(matches!(send(&chan, Value::Int(1)), SendOutcome::ClosedError));
    }

    #[test]
    fn capacity_bounds_non_blocking_sends() {
        let chan = new_chan(2);
        assert!(matches!(send(&chan, Value::Int(1)), SendOutcome::Sent));
        assert!(matches!(send(&chan, Value::Int(2)), SendOutcome::Sent));
        assert_eq!(chan.state.lock().unwrap().buffer.len(), 2);
    }
}
