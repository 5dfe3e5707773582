use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{EventHandler, EventProducer, Handler, TransactionStateChanged};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub state_changed_producer: Vec<EventProducer<TransactionStateChanged>>,
}

pub struct EventHandlers {
    pub on_state_changed: Option<EventHandler<TransactionStateChanged>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_state_changed = hooks.on_state_changed.map(|f| EventHandler::new(buffer_size, f));
        Self { on_state_changed }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_state_changed {
            result.state_changed_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_state_changed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_state_changed: Option<Handler<TransactionStateChanged>>,
}

impl EventHooks {
    pub fn on_state_changed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(TransactionStateChanged) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static
    {
        self.on_state_changed = Some(Arc::new(f));
        self
    }
}
