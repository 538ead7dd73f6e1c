use tokio::sync::watch;

/// Single-writer state container; readers subscribe and always see the
/// latest full value.
/// 單一寫入者的狀態容器；訂閱者總是取得最新的完整值。
#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T> Observable<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Replaces the value and notifies subscribers.
    /// 取代目前的值並通知訂閱者。
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Mutates the value in place and notifies subscribers.
    pub fn update(&self, op: impl FnOnce(&mut T)) {
        self.tx.send_modify(op);
    }

    /// Borrows the current value for the duration of `op`.
    pub fn with<R>(&self, op: impl FnOnce(&T) -> R) -> R {
        op(&self.tx.borrow())
    }

    /// Returns a receiver that starts at the current value.
    /// 取得一個從目前值開始的接收端。
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone> Observable<T> {
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
