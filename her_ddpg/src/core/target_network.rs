//! Target network tracking via Polyak averaging.
//!
//! ```text
//! θ_target = τ * θ_online + (1 - τ) * θ_target
//! ```
//!
//! Parameters of the online and target modules are paired by traversal order,
//! so the two only need the same architecture, not the same `ParamId`s.

use burn::module::{Module, ModuleMapper, Param};
use burn::prelude::*;

/// Collects every float parameter of a module, flattened to 1D.
struct ParamExtractor<B: Backend> {
    params: Vec<Tensor<B, 1>>,
}

impl<B: Backend> ModuleMapper<B> for ParamExtractor<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let val = param.val();
        let numel: usize = val.dims().iter().product();
        self.params.push(val.reshape([numel]));
        param
    }
}

/// Interpolates each target parameter towards its online counterpart.
struct PolyakMapper<B: Backend> {
    online: Vec<Tensor<B, 1>>,
    tau: f32,
    index: usize,
}

impl<B: Backend> ModuleMapper<B> for PolyakMapper<B> {
    fn map_float<const D: usize>(&mut self, param: Param<Tensor<B, D>>) -> Param<Tensor<B, D>> {
        let target = param.val();
        let shape = target.dims();
        let numel: usize = shape.iter().product();
        let idx = self.index;
        self.index += 1;

        match self.online.get(idx) {
            Some(online) => {
                let mixed = online.clone().mul_scalar(self.tau)
                    + target.reshape([numel]).mul_scalar(1.0 - self.tau);
                Param::initialized(param.id.clone(), mixed.reshape(shape))
            }
            None => {
                log::warn!("target network has more parameters than online network");
                param
            }
        }
    }
}

/// Soft-update `target` towards `online` with coefficient `tau`.
///
/// `tau = 1` returns a copy of the online module, `tau = 0` returns the
/// target unchanged.
pub fn soft_update<B, M>(online: &M, target: M, tau: f32) -> M
where
    B: Backend,
    M: Module<B>,
{
    if (tau - 1.0).abs() < 1e-6 {
        return hard_copy::<B, M>(online);
    }
    if tau.abs() < 1e-6 {
        return target;
    }

    let mut extractor = ParamExtractor { params: Vec::new() };
    let _ = online.clone().map(&mut extractor);

    let mut mapper = PolyakMapper {
        online: extractor.params,
        tau,
        index: 0,
    };
    target.map(&mut mapper)
}

/// Copy the online module into a fresh target.
pub fn hard_copy<B, M>(online: &M) -> M
where
    B: Backend,
    M: Module<B>,
{
    online.clone()
}
