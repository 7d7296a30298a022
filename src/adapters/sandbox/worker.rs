//! The interpreter thread behind a compiled sandbox function.
//!
//! The interpreter context is not `Send`, so each compiled function owns one
//! OS thread running a current-thread runtime. Calls arrive over a channel;
//! asynchronous host functions run on that runtime and settle the sandbox
//! promises they handed out.

use boa_engine::builtins::promise::{PromiseState, ResolvingFunctions};
use boa_engine::object::builtins::JsPromise;
use boa_engine::vm::RuntimeLimits;
use boa_engine::{Context, JsError, JsNativeError, JsObject, JsString, JsValue, NativeFunction, Source};
use futures::future::{BoxFuture, FutureExt, LocalBoxFuture};
use futures::stream::{FuturesUnordered, StreamExt};
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::time::error::Elapsed;

use super::marshal;
use super::SandboxOptions;
use crate::domain::{HostFunction, HostResult, HostValue, ProxyError, Result, SandboxBindings};

pub(crate) enum Command {
    Call {
        args: Vec<HostValue>,
        reply: oneshot::Sender<Result<HostValue>>,
    },
}

pub(crate) struct Startup {
    pub source: String,
    pub entry: String,
    pub bindings: SandboxBindings,
    pub options: SandboxOptions,
}

/// A host call issued by the script, waiting to be polled by the worker loop.
struct HostCall {
    future: BoxFuture<'static, HostResult>,
    resolvers: ResolvingFunctions,
}

type HostQueue = Rc<RefCell<Vec<HostCall>>>;
type Settled = (std::result::Result<HostResult, Elapsed>, ResolvingFunctions);

struct Evaluation {
    promise: JsPromise,
    reply: oneshot::Sender<Result<HostValue>>,
}

struct Worker {
    context: Context,
    entry: JsObject,
    entry_name: String,
    label: String,
    queue: HostQueue,
    host_call_timeout: Duration,
}

/// Thread body. Reports compile success or failure on `ready`, then serves
/// calls until every sender is gone.
pub(crate) fn run(startup: Startup, ready: oneshot::Sender<Result<()>>, commands: mpsc::UnboundedReceiver<Command>) {
    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            let _ = ready.send(Err(ProxyError::Sandbox(format!("Failed to start sandbox runtime: {}", e))));
            return;
        }
    };

    let worker = match Worker::new(startup) {
        Ok(worker) => worker,
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };

    if ready.send(Ok(())).is_err() {
        return;
    }
    runtime.block_on(worker.serve(commands));
    log::debug!("Sandbox worker exited");
}

impl Worker {
    fn new(startup: Startup) -> Result<Self> {
        let Startup {
            source,
            entry,
            bindings,
            options,
        } = startup;

        let mut context = Context::default();
        let mut limits = RuntimeLimits::default();
        limits.set_loop_iteration_limit(options.loop_iteration_limit);
        limits.set_recursion_limit(options.recursion_limit);
        context.set_runtime_limits(limits);

        let queue: HostQueue = Rc::new(RefCell::new(Vec::new()));
        for (name, function) in bindings {
            let native = native_function(function, queue.clone());
            context
                .register_global_callable(JsString::from(name.as_str()), 0, native)
                .map_err(|e| ProxyError::Sandbox(format!("Failed to bind `{}`: {}", name, e)))?;
        }

        let label = options.source_label.clone();
        context
            .eval(Source::from_bytes(source.as_str()).with_path(Path::new(&label)))
            .map_err(|e| ProxyError::Script(marshal::from_js_error(e, &mut context).located("<top level>", &label)))?;

        // Evaluated as an expression so `const`/`let` bindings are found too.
        let found = match context.eval(Source::from_bytes(entry.as_str())) {
            Ok(value) => value,
            Err(_) => JsValue::undefined(),
        };
        let entry_fn = match found.as_callable() {
            Some(function) => function.clone(),
            None => {
                return Err(ProxyError::EntryNotFound {
                    name: entry,
                    found: marshal::type_name(&found).to_string(),
                })
            }
        };

        Ok(Self {
            context,
            entry: entry_fn,
            entry_name: entry,
            label,
            queue,
            host_call_timeout: options.host_call_timeout,
        })
    }

    async fn serve(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        let mut in_flight: FuturesUnordered<LocalBoxFuture<'static, Settled>> = FuturesUnordered::new();
        let mut evaluations: Vec<Evaluation> = Vec::new();
        let mut closed = false;

        loop {
            self.context.run_jobs();
            self.poll_host_calls(&mut in_flight);
            self.settle(&mut evaluations, in_flight.is_empty());

            if closed && evaluations.is_empty() {
                break;
            }

            tokio::select! {
                command = commands.recv(), if !closed => match command {
                    Some(Command::Call { args, reply }) => self.start(args, reply, &mut evaluations),
                    None => closed = true,
                },
                Some((outcome, resolvers)) = in_flight.next(), if !in_flight.is_empty() => {
                    self.complete_host_call(outcome, resolvers);
                }
                else => break,
            }
        }
    }

    fn poll_host_calls(&mut self, in_flight: &mut FuturesUnordered<LocalBoxFuture<'static, Settled>>) {
        let timeout = self.host_call_timeout;
        for call in self.queue.borrow_mut().drain(..) {
            let HostCall { future, resolvers } = call;
            in_flight.push(async move { (tokio::time::timeout(timeout, future).await, resolvers) }.boxed_local());
        }
    }

    fn start(&mut self, args: Vec<HostValue>, reply: oneshot::Sender<Result<HostValue>>, evaluations: &mut Vec<Evaluation>) {
        let context = &mut self.context;
        let (entry, label) = (self.entry_name.as_str(), self.label.as_str());

        let js_args = match args
            .iter()
            .map(|arg| marshal::to_js(arg, context))
            .collect::<std::result::Result<Vec<_>, JsError>>()
        {
            Ok(js_args) => js_args,
            Err(e) => {
                let _ = reply.send(Err(ProxyError::Script(
                    marshal::from_js_error(e, context).located(entry, label),
                )));
                return;
            }
        };

        let value = match self.entry.call(&JsValue::undefined(), &js_args, context) {
            Ok(value) => value,
            Err(e) => {
                let _ = reply.send(Err(ProxyError::Script(
                    marshal::from_js_error(e, context).located(entry, label),
                )));
                return;
            }
        };

        let promise = value.as_object().and_then(|object| JsPromise::from_object(object.clone()).ok());
        match promise {
            Some(promise) => evaluations.push(Evaluation { promise, reply }),
            None => {
                let result = marshal::to_host(&value, context)
                    .map_err(|e| ProxyError::Script(marshal::from_js_error(e, context).located(entry, label)));
                let _ = reply.send(result);
            }
        }
    }

    fn settle(&mut self, evaluations: &mut Vec<Evaluation>, idle: bool) {
        let context = &mut self.context;
        let (entry, label) = (self.entry_name.as_str(), self.label.as_str());
        let mut index = 0;
        while index < evaluations.len() {
            let result = match evaluations[index].promise.state() {
                PromiseState::Pending if idle => Err(ProxyError::Sandbox(
                    "FindProxyForURL returned a promise that never settled".to_string(),
                )),
                PromiseState::Pending => {
                    index += 1;
                    continue;
                }
                PromiseState::Fulfilled(value) => marshal::to_host(&value, context)
                    .map_err(|e| ProxyError::Script(marshal::from_js_error(e, context).located(entry, label))),
                PromiseState::Rejected(reason) => Err(ProxyError::Script(
                    marshal::script_error(&reason, context).located(entry, label),
                )),
            };

            let evaluation = evaluations.swap_remove(index);
            let _ = evaluation.reply.send(result);
        }
    }

    fn complete_host_call(&mut self, outcome: std::result::Result<HostResult, Elapsed>, resolvers: ResolvingFunctions) {
        let context = &mut self.context;
        let settled = match outcome {
            Ok(Ok(value)) => marshal::to_js(&value, context).map(|v| (true, v)),
            Ok(Err(e)) => Ok((false, marshal::host_error(&e).to_opaque(context))),
            Err(_) => {
                let err: JsError = JsNativeError::error().with_message("host call timed out").into();
                Ok((false, err.to_opaque(context)))
            }
        };

        let (function, value) = match settled {
            Ok((true, value)) => (&resolvers.resolve, value),
            Ok((false, reason)) => (&resolvers.reject, reason),
            Err(e) => (&resolvers.reject, e.to_opaque(context)),
        };
        if let Err(e) = function.call(&JsValue::undefined(), &[value], context) {
            log::warn!("Failed to settle sandbox promise: {}", e);
        }
    }
}

fn native_function(function: HostFunction, queue: HostQueue) -> NativeFunction {
    // SAFETY: the closures capture an `Arc` host function and the host call
    // queue. The queue does hold `ResolvingFunctions` between a call and the
    // next worker turn, but it is never reached through `Trace`, so the
    // collector counts those handles as roots and cannot free them. The worker
    // owns the same queue, which outlives every function object it backs.
    match function {
        HostFunction::Sync(f) => unsafe {
            NativeFunction::from_closure(move |_this, args, context| {
                let args = marshal::to_host_args(args, context)?;
                match f(&args) {
                    Ok(value) => marshal::to_js(&value, context),
                    Err(e) => Err(marshal::host_error(&e)),
                }
            })
        },
        HostFunction::Async(f) => unsafe {
            NativeFunction::from_closure(move |_this, args, context| {
                let args = marshal::to_host_args(args, context)?;
                let (promise, resolvers) = JsPromise::new_pending(context);
                queue.borrow_mut().push(HostCall {
                    future: f(args),
                    resolvers,
                });
                Ok(promise.into())
            })
        },
    }
}
