//! 집계기와 점수 워커 사이의 bounded 윈도우 큐
//!
//! 큐가 가득 차면 가장 오래된 항목을 버리고 손실로 집계합니다.
//! `push`는 절대 대기하지 않으므로 캡처 경로가 하류 I/O에 막히지 않습니다.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;
use tokio::sync::Notify;

#[derive(Debug)]
struct QueueState<T> {
    items: VecDeque<T>,
    closed: bool,
}

/// drop-oldest bounded 큐 (다중 생산자, 단일 소비자)
#[derive(Debug)]
pub struct WindowQueue<T> {
    state: Mutex<QueueState<T>>,
    capacity: usize,
    notify: Notify,
    dropped: AtomicU64,
}

impl<T> WindowQueue<T> {
    /// `capacity`는 1 이상으로 보정됩니다.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            state: Mutex::new(QueueState {
                items: VecDeque::with_capacity(capacity),
                closed: false,
            }),
            capacity,
            notify: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    /// 항목을 넣습니다. 용량을 넘으면 밀려난 가장 오래된 항목을 반환합니다.
    ///
    /// 닫힌 큐에 넣은 항목은 그대로 되돌려 받습니다.
    pub fn push(&self, item: T) -> Option<T> {
        let evicted = {
            let mut state = self.state.lock();
            if state.closed {
                return Some(item);
            }
            let evicted = if state.items.len() >= self.capacity {
                state.items.pop_front()
            } else {
                None
            };
            state.items.push_back(item);
            evicted
        };

        if evicted.is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        self.notify.notify_one();
        evicted
    }

    /// 다음 항목을 기다립니다. 큐가 닫히고 비면 `None`입니다.
    pub async fn pop(&self) -> Option<T> {
        loop {
            let notified = self.notify.notified();
            {
                let mut state = self.state.lock();
                if let Some(item) = state.items.pop_front() {
                    return Some(item);
                }
                if state.closed {
                    return None;
                }
            }
            notified.await;
        }
    }

    /// 대기 없이 꺼냅니다.
    pub fn try_pop(&self) -> Option<T> {
        self.state.lock().items.pop_front()
    }

    /// 큐를 닫습니다. 남은 항목은 계속 꺼낼 수 있습니다.
    pub fn close(&self) {
        self.state.lock().closed = true;
        self.notify.notify_waiters();
        self.notify.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().closed
    }

    pub fn len(&self) -> usize {
        self.state.lock().items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// 포화로 버려진 항목 수
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
