use proc_macro::TokenStream;
use quote::quote;
use syn::{parse_macro_input, FnArg, ItemFn, Pat, Signature};

/// Times a simulation system when the `perf_stats` feature is enabled.
///
/// The generated guard reports on drop through `bevy::prelude::info!` when the
/// body ran longer than the threshold (milliseconds, default 1). When the
/// system takes a `tick: Res<SimTick>` parameter the guard also reports every
/// 100th tick so phase costs show up in steady state.
///
/// ```ignore
/// #[profile(2)]
/// pub fn resolve_collisions(tick: Res<SimTick>, ...) { ... }
/// ```
///
/// Without the feature the attribute leaves the function untouched apart
/// from a `cfg`-gated statement, so release builds pay nothing.
#[proc_macro_attribute]
pub fn profile(attr: TokenStream, item: TokenStream) -> TokenStream {
    let input = parse_macro_input!(item as ItemFn);
    let threshold_ms = parse_threshold(&attr.to_string());

    let attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let block = &input.block;
    let name = sig.ident.to_string();

    let tick_expr = if takes_sim_tick(sig) {
        quote! { Some(tick.0) }
    } else {
        quote! { None }
    };

    let output = quote! {
        #(#attrs)*
        #vis #sig {
            #[cfg(feature = "perf_stats")]
            let _phase_timer = {
                struct PhaseTimer {
                    name: &'static str,
                    started: std::time::Instant,
                    tick: Option<u64>,
                }
                impl Drop for PhaseTimer {
                    fn drop(&mut self) {
                        let elapsed = self.started.elapsed();
                        let periodic = self.tick.map_or(false, |t| t % 100 == 0);
                        if elapsed.as_millis() > #threshold_ms || periodic {
                            match self.tick {
                                Some(t) => bevy::prelude::info!("[PERF] {} | tick: {} | took: {:?}", self.name, t, elapsed),
                                None => bevy::prelude::info!("[PERF] {} | took: {:?}", self.name, elapsed),
                            }
                        }
                    }
                }
                PhaseTimer {
                    name: #name,
                    started: std::time::Instant::now(),
                    tick: #tick_expr,
                }
            };

            #block
        }
    };

    output.into()
}

fn parse_threshold(raw: &str) -> u128 {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return 1;
    }
    trimmed.parse().unwrap_or(1)
}

/// True when the signature has a parameter named `tick` whose type mentions `SimTick`.
fn takes_sim_tick(sig: &Signature) -> bool {
    sig.inputs.iter().any(|arg| match arg {
        FnArg::Typed(pat_type) => match &*pat_type.pat {
            Pat::Ident(ident) if ident.ident == "tick" => {
                let ty = &pat_type.ty;
                quote!(#ty).to_string().contains("SimTick")
            }
            _ => false,
        },
        FnArg::Receiver(_) => false,
    })
}
