//! Link-only supervisor for per-connection child actors.
//!
//! Gateway children are restarted by reconnecting, never in place, so this
//! parent only gives them a stable actor to link against and records why each
//! one went away.

use std::convert::Infallible;
use std::marker::PhantomData;
use std::ops::ControlFlow;

use kameo::{
    Actor,
    actor::{ActorId, ActorRef, WeakActorRef},
    error::ActorStopReason,
};
use tracing::debug;

pub struct LinkSupervisor<A>
where
    A: Actor + Send + Sync + 'static,
{
    name: &'static str,
    children_lost: u64,
    _phantom: PhantomData<fn() -> A>,
}

impl<A> LinkSupervisor<A>
where
    A: Actor + Send + Sync + 'static,
{
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            children_lost: 0,
            _phantom: PhantomData,
        }
    }

    pub fn spawn_named(name: &'static str) -> ActorRef<Self> {
        Self::spawn(Self::new(name))
    }
}

impl<A> Actor for LinkSupervisor<A>
where
    A: Actor + Send + Sync + 'static,
{
    type Args = Self;
    type Error = Infallible;

    async fn on_start(args: Self::Args, _actor_ref: ActorRef<Self>) -> Result<Self, Self::Error> {
        Ok(args)
    }

    fn on_link_died(
        &mut self,
        _actor_ref: WeakActorRef<Self>,
        id: ActorId,
        reason: ActorStopReason,
    ) -> impl std::future::Future<Output = Result<ControlFlow<ActorStopReason>, Self::Error>> + Send
    {
        self.children_lost = self.children_lost.saturating_add(1);
        debug!(
            supervisor = self.name,
            child = ?id,
            reason = ?reason,
            children_lost = self.children_lost,
            "supervised child stopped"
        );
        async { Ok(ControlFlow::Continue(())) }
    }
}
