use rand::Rng;

use super::function_identity::FunctionIdentity;
use super::trigger::{FunctionReference, WeightedFunction};

/// Picks the concrete function a request is sent to.
pub trait FunctionSelector: Send + Sync {
    fn select<'a>(&self, reference: &'a FunctionReference) -> Option<&'a FunctionIdentity>;
}

/// Weighted random selection; zero-weight members are never chosen.
#[derive(Debug, Default, Clone, Copy)]
pub struct WeightedRandomSelector;

impl FunctionSelector for WeightedRandomSelector {
    fn select<'a>(&self, reference: &'a FunctionReference) -> Option<&'a FunctionIdentity> {
        match reference {
            FunctionReference::SingleFunction { function } => Some(function),
            FunctionReference::WeightedGroup { functions } => {
                let threshold = {
                    let total: u64 = functions.iter().map(|f| f.weight as u64).sum();
                    if total == 0 {
                        return None;
                    }
                    rand::thread_rng().gen_range(0..total)
                };
                pick_weighted(functions, threshold)
            }
        }
    }
}

fn pick_weighted(functions: &[WeightedFunction], mut threshold: u64) -> Option<&FunctionIdentity> {
    for f in functions {
        let w = f.weight as u64;
        if threshold < w {
            return Some(&f.function);
        }
        threshold -= w;
    }
    None
}
