use core::cell::{Ref, RefCell};

use critical_section::{CriticalSection, Mutex};
use heapless::Deque;

/// Status codes observed by the interrupt handler, newest last.
pub struct StateHolder<const HISTORY_SIZE: usize> {
    history: Mutex<RefCell<Deque<u8, HISTORY_SIZE>>>,
}

impl<const HISTORY_SIZE: usize> StateHolder<HISTORY_SIZE> {
    pub const fn new() -> Self {
        Self {
            history: Mutex::new(RefCell::new(Deque::new())),
        }
    }

    pub fn record(&self, cs: CriticalSection, state: u8) {
        let mut h = self.history.borrow_ref_mut(cs);
        if h.is_full() {
            h.pop_front();
        }
        h.push_back(state).ok();
    }

    pub fn clear(&self, cs: CriticalSection) {
        self.history.borrow_ref_mut(cs).clear();
    }

    pub fn get_history<'cs>(
        &'cs self,
        cs: CriticalSection<'cs>,
    ) -> Ref<'cs, Deque<u8, HISTORY_SIZE>> {
        self.history.borrow_ref(cs)
    }
}
