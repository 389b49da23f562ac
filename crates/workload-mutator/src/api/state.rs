use crate::dispatcher::Dispatcher;

pub(crate) struct ApiServerState {
    pub(crate) dispatcher: Dispatcher,
}
