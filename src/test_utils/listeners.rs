use std::sync::Arc;

use parking_lot::Condvar;
use parking_lot::Mutex;

use crate::Address;
use crate::CommandListener;
use crate::ServiceListener;

/// Records every service notification it receives
#[derive(Default)]
pub(crate) struct RecordingServiceListener {
    calls: Mutex<Vec<(Address, Vec<Address>)>>,
}

impl RecordingServiceListener {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn calls(&self) -> Vec<(Address, Vec<Address>)> {
        self.calls.lock().clone()
    }

    pub(crate) fn last_addresses(&self) -> Option<Vec<Address>> {
        self.calls.lock().last().map(|(_, addresses)| addresses.clone())
    }
}

impl ServiceListener for RecordingServiceListener {
    fn notify_service(
        &self,
        subscriber: &Address,
        addresses: &[Address],
    ) {
        self.calls.lock().push((subscriber.clone(), addresses.to_vec()));
    }
}

/// Records every command notification it receives
#[derive(Default)]
pub(crate) struct RecordingCommandListener {
    calls: Mutex<Vec<(Address, String, String)>>,
}

impl RecordingCommandListener {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    pub(crate) fn commands(&self) -> Vec<String> {
        self.calls.lock().iter().map(|(_, _, command)| command.clone()).collect()
    }

    pub(crate) fn calls(&self) -> Vec<(Address, String, String)> {
        self.calls.lock().clone()
    }
}

impl CommandListener for RecordingCommandListener {
    fn notify_command(
        &self,
        subscriber: &Address,
        group: &str,
        command: &str,
    ) {
        self.calls
            .lock()
            .push((subscriber.clone(), group.to_string(), command.to_string()));
    }
}

/// Service listener that blocks its caller until the gate is opened
#[derive(Default)]
pub(crate) struct GatedServiceListener {
    open: Mutex<bool>,
    opened: Condvar,
    entered: Mutex<usize>,
    /// Address lists of callbacks that passed the gate, in order
    passed: Mutex<Vec<Vec<Address>>>,
}

impl GatedServiceListener {
    pub(crate) fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub(crate) fn open(&self) {
        *self.open.lock() = true;
        self.opened.notify_all();
    }

    /// Number of callbacks that have started (and possibly still block)
    pub(crate) fn entered(&self) -> usize {
        *self.entered.lock()
    }

    pub(crate) fn passed(&self) -> Vec<Vec<Address>> {
        self.passed.lock().clone()
    }

    pub(crate) fn last_addresses(&self) -> Option<Vec<Address>> {
        self.passed.lock().last().cloned()
    }
}

impl ServiceListener for GatedServiceListener {
    fn notify_service(
        &self,
        _subscriber: &Address,
        addresses: &[Address],
    ) {
        *self.entered.lock() += 1;
        {
            let mut open = self.open.lock();
            while !*open {
                self.opened.wait(&mut open);
            }
        }
        self.passed.lock().push(addresses.to_vec());
    }
}

/// Service listener that always panics
pub(crate) struct PanickingServiceListener;

impl ServiceListener for PanickingServiceListener {
    fn notify_service(
        &self,
        _subscriber: &Address,
        _addresses: &[Address],
    ) {
        panic!("listener failure");
    }
}
