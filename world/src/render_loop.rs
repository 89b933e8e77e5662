use fiducial_sim_core::{HookControl, PreRenderHook};

/// Handle identifying a pre-render subscription.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(u64);

impl ConnectionId {
    /// Retrieves the numeric representation of the connection.
    #[must_use]
    pub const fn get(&self) -> u64 {
        self.0
    }
}

/// Frame loop that invokes pre-render hooks until they disconnect.
///
/// Hooks run in connection order. A hook returning
/// [`HookControl::Disconnect`] is dropped before the next frame.
pub struct RenderLoop<'hook> {
    hooks: Vec<(ConnectionId, Box<dyn PreRenderHook + 'hook>)>,
    next_connection: u64,
    frames_rendered: u64,
}

impl<'hook> RenderLoop<'hook> {
    /// Creates a loop with no subscriptions.
    #[must_use]
    pub fn new() -> Self {
        Self {
            hooks: Vec::new(),
            next_connection: 0,
            frames_rendered: 0,
        }
    }

    /// Subscribes a hook to run before every frame until it disconnects.
    pub fn connect_pre_render<H>(&mut self, hook: H) -> ConnectionId
    where
        H: PreRenderHook + 'hook,
    {
        let id = ConnectionId(self.next_connection);
        self.next_connection += 1;
        self.hooks.push((id, Box::new(hook)));
        tracing::debug!(connection = id.get(), "pre-render hook connected");
        id
    }

    /// Drops a subscription, returning `true` when it was still connected.
    pub fn disconnect(&mut self, id: ConnectionId) -> bool {
        let before = self.hooks.len();
        self.hooks.retain(|(connection, _)| *connection != id);
        before != self.hooks.len()
    }

    /// Reports whether the subscription is still connected.
    #[must_use]
    pub fn is_connected(&self, id: ConnectionId) -> bool {
        self.hooks.iter().any(|(connection, _)| *connection == id)
    }

    /// Number of subscriptions still connected.
    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.hooks.len()
    }

    /// Number of frames rendered so far.
    #[must_use]
    pub const fn frames_rendered(&self) -> u64 {
        self.frames_rendered
    }

    /// Runs every connected hook once, then counts the frame as rendered.
    pub fn render_frame(&mut self) {
        self.hooks.retain_mut(|(connection, hook)| {
            match hook.on_pre_render() {
                HookControl::Keep => true,
                HookControl::Disconnect => {
                    tracing::debug!(connection = connection.get(), "pre-render hook disconnected");
                    false
                }
            }
        });
        self.frames_rendered += 1;
    }

    /// Renders frames until no hooks remain or `max_frames` frames were rendered.
    ///
    /// Returns the number of frames rendered by this call.
    pub fn run_until_idle(&mut self, max_frames: u64) -> u64 {
        let mut rendered = 0;
        while rendered < max_frames && !self.hooks.is_empty() {
            self.render_frame();
            rendered += 1;
        }
        rendered
    }
}

impl Default for RenderLoop<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RenderLoop<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLoop")
            .field("connections", &self.hooks.len())
            .field("frames_rendered", &self.frames_rendered)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct CountDown {
        remaining: u32,
        calls: u32,
    }

    impl PreRenderHook for CountDown {
        fn on_pre_render(&mut self) -> HookControl {
            self.calls += 1;
            if self.remaining <= 1 {
                HookControl::Disconnect
            } else {
                self.remaining -= 1;
                HookControl::Keep
            }
        }
    }

    #[test]
    fn hook_runs_until_it_disconnects() {
        let mut hook = CountDown {
            remaining: 3,
            calls: 0,
        };
        {
            let mut render_loop = RenderLoop::new();
            let id = render_loop.connect_pre_render(&mut hook);
            render_loop.render_frame();
            render_loop.render_frame();
            assert!(render_loop.is_connected(id));
            render_loop.render_frame();
            assert!(!render_loop.is_connected(id));
            render_loop.render_frame();
            assert_eq!(render_loop.frames_rendered(), 4);
        }

        assert_eq!(hook.calls, 3, "disconnected hook must not run again");
    }

    #[test]
    fn run_until_idle_stops_when_no_hooks_remain() {
        let mut render_loop = RenderLoop::new();
        let _ = render_loop.connect_pre_render(CountDown {
            remaining: 2,
            calls: 0,
        });

        assert_eq!(render_loop.run_until_idle(10), 2);
        assert_eq!(render_loop.connection_count(), 0);
    }

    #[test]
    fn explicit_disconnect_removes_hook() {
        let mut render_loop = RenderLoop::new();
        let id = render_loop.connect_pre_render(CountDown {
            remaining: 5,
            calls: 0,
        });

        assert!(render_loop.disconnect(id));
        assert!(!render_loop.disconnect(id));
        assert_eq!(render_loop.connection_count(), 0);
    }
}
