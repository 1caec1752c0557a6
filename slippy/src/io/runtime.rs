//! Drives the asset fetch loop off the host's rendering thread. What "off the thread" means
//! depends on the target.
#[cfg(not(target_arch = "wasm32"))]
pub(crate) use native::*;

#[cfg(target_arch = "wasm32")]
pub(crate) use web::*;

#[cfg(target_arch = "wasm32")]
mod web {
    pub struct Runtime;

    impl Runtime {
        pub fn new<F>(f: F) -> Self
        where
            F: std::future::Future<Output = ()> + 'static,
        {
            wasm_bindgen_futures::spawn_local(f);
            Self {}
        }
    }
}

#[cfg(not(target_arch = "wasm32"))]
mod native {
    use tokio::sync::oneshot;

    /// A dedicated thread running the fetch loop until its owner is dropped.
    pub struct Runtime {
        thread: Option<std::thread::JoinHandle<()>>,

        /// Dropped to tell the thread to shut down.
        shutdown_tx: Option<oneshot::Sender<()>>,
    }

    impl Runtime {
        pub fn new<F>(f: F) -> Self
        where
            F: std::future::Future + Send + 'static,
            F::Output: Send,
        {
            let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

            let thread = std::thread::Builder::new()
                .name("slippy-io".to_string())
                .spawn(move || {
                    let runtime = match tokio::runtime::Builder::new_current_thread()
                        .enable_all()
                        .build()
                    {
                        Ok(runtime) => runtime,
                        Err(error) => {
                            log::error!(
                                "Could not build the IO runtime, fetches will not work: {error}"
                            );
                            return;
                        }
                    };

                    runtime.spawn(f);
                    // Resolves with an error once the sender is dropped; either way, time to go.
                    let _ = runtime.block_on(shutdown_rx);
                });

            let thread = match thread {
                Ok(handle) => Some(handle),
                Err(error) => {
                    log::error!("Could not spawn the IO thread, fetches will not work: {error}");
                    None
                }
            };

            Self {
                thread,
                shutdown_tx: Some(shutdown_tx),
            }
        }
    }

    impl Drop for Runtime {
        fn drop(&mut self) {
            drop(self.shutdown_tx.take());

            if let Some(thread) = self.thread.take() {
                log::debug!("Waiting for the IO thread to exit.");
                // The thread might have died on its own already.
                let _ = thread.join();
            }

            log::debug!("IO thread is down.");
        }
    }
}
