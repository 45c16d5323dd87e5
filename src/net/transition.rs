//! 迁移：守卫表达式与输入/输出弧（库所名 -> 注记）。
//!
//! 激发条件按 `(guard, tokens, types)` 三步检查：
//! 1. 守卫在绑定下为真；
//! 2. 若检查可用性，每条输入弧的 flow 不超过库所当前令牌；
//! 3. 若检查输入类型，输入令牌满足库所约束；输出令牌的类型**总是**检查。
//!
//! 模式搜索只在输入弧上进行，输出弧上的变量无法从令牌得到取值。
use std::collections::BTreeSet;

use indexmap::IndexMap;
use log::trace;

use crate::expr::{Environment, Expression};
use crate::net::annotation::ArcAnnotation;
use crate::net::core::PetriNet;
use crate::net::error::{FiringError, NetError, NetResult, StructuralError};
use crate::net::marking::Marking;
use crate::net::place::Place;
use crate::net::substitution::{Substitution, combine};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub name: String,
    pub guard: Expression,
    pub(crate) inputs: IndexMap<String, ArcAnnotation>,
    pub(crate) outputs: IndexMap<String, ArcAnnotation>,
}

impl Transition {
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_guard(name, Expression::truth())
    }

    pub fn with_guard(name: impl Into<String>, guard: Expression) -> Self {
        Self {
            name: name.into(),
            guard,
            inputs: IndexMap::new(),
            outputs: IndexMap::new(),
        }
    }

    pub fn input(&self) -> impl Iterator<Item = (&str, &ArcAnnotation)> {
        self.inputs.iter().map(|(p, a)| (p.as_str(), a))
    }

    pub fn output(&self) -> impl Iterator<Item = (&str, &ArcAnnotation)> {
        self.outputs.iter().map(|(p, a)| (p.as_str(), a))
    }

    pub fn input_arc(&self, place: &str) -> Option<&ArcAnnotation> {
        self.inputs.get(place)
    }

    pub fn output_arc(&self, place: &str) -> Option<&ArcAnnotation> {
        self.outputs.get(place)
    }

    pub(crate) fn add_input(
        &mut self,
        place: &str,
        label: ArcAnnotation,
    ) -> Result<(), StructuralError> {
        if self.inputs.contains_key(place) {
            return Err(StructuralError::AlreadyConnected(place.to_string()));
        }
        label.validate()?;
        if !label.input_allowed() {
            return Err(StructuralError::InputNotAllowed(label.kind_name()));
        }
        self.inputs.insert(place.to_string(), label);
        Ok(())
    }

    pub(crate) fn remove_input(&mut self, place: &str) -> Result<ArcAnnotation, StructuralError> {
        self.inputs
            .shift_remove(place)
            .ok_or_else(|| StructuralError::NotConnected(place.to_string()))
    }

    pub(crate) fn add_output(
        &mut self,
        place: &str,
        label: ArcAnnotation,
    ) -> Result<(), StructuralError> {
        if self.outputs.contains_key(place) {
            return Err(StructuralError::AlreadyConnected(place.to_string()));
        }
        label.validate()?;
        self.outputs.insert(place.to_string(), label);
        Ok(())
    }

    pub(crate) fn remove_output(&mut self, place: &str) -> Result<ArcAnnotation, StructuralError> {
        self.outputs
            .shift_remove(place)
            .ok_or_else(|| StructuralError::NotConnected(place.to_string()))
    }

    /// 守卫与所有弧上的自由变量。
    pub fn vars(&self) -> BTreeSet<String> {
        let mut result = self.guard.vars().unwrap_or_default();
        for label in self.inputs.values().chain(self.outputs.values()) {
            result.extend(label.vars());
        }
        result
    }

    /// 重命名守卫与弧上的变量，连接关系不变。
    pub fn substitute(&self, renaming: &Substitution) -> NetResult<Transition> {
        let rename_arcs = |arcs: &IndexMap<String, ArcAnnotation>| {
            arcs.iter()
                .map(|(place, label)| -> NetResult<(String, ArcAnnotation)> {
                    Ok((place.clone(), label.substitute(renaming)?))
                })
                .collect::<NetResult<IndexMap<_, _>>>()
        };
        Ok(Transition {
            name: self.name.clone(),
            guard: self.guard.substitute(renaming)?,
            inputs: rename_arcs(&self.inputs)?,
            outputs: rename_arcs(&self.outputs)?,
        })
    }

    /// 只出现在守卫或输出弧、无法从输入弧取得值的变量（全局名字除外）。
    pub fn unbound_output_vars(&self, env: &Environment) -> BTreeSet<String> {
        let bound: BTreeSet<String> = self.inputs.values().flat_map(|a| a.vars()).collect();
        let mut free = self.guard.vars().unwrap_or_default();
        for label in self.outputs.values() {
            free.extend(label.vars());
        }
        free.into_iter()
            .filter(|name| !bound.contains(name) && !env.is_global(name))
            .collect()
    }

    fn types_respected(
        place: &Place,
        label: &ArcAnnotation,
        binding: &Substitution,
        env: &Environment,
    ) -> NetResult<bool> {
        let tokens = label.tokens(binding, env)?;
        Ok(place.check(&tokens).is_ok())
    }

    /// 检查绑定：守卫、（可选）令牌可用性、（可选）输入类型、输出类型。
    pub fn check(
        &self,
        net: &PetriNet,
        binding: &Substitution,
        tokens: bool,
        input: bool,
    ) -> NetResult<bool> {
        let env = net.env();
        if !self.guard.holds(binding, env)? {
            return Ok(false);
        }
        if tokens {
            for (name, label) in &self.inputs {
                let place = net.place(name)?;
                if !label.flow(binding, env)?.is_subset_of(place.tokens()) {
                    return Ok(false);
                }
            }
        }
        if input {
            for (name, label) in &self.inputs {
                if !Self::types_respected(net.place(name)?, label, binding, env)? {
                    return Ok(false);
                }
            }
        }
        for (name, label) in &self.outputs {
            if !Self::types_respected(net.place(name)?, label, binding, env)? {
                return Ok(false);
            }
        }
        Ok(true)
    }

    /// 不考虑令牌可用性的激活检查。
    pub fn activated(&self, net: &PetriNet, binding: &Substitution) -> NetResult<bool> {
        self.check(net, binding, false, true)
    }

    pub fn enabled(&self, net: &PetriNet, binding: &Substitution) -> NetResult<bool> {
        self.check(net, binding, true, true)
    }

    /// 实际模式：只考虑输入库所中现有令牌的绑定。
    ///
    /// 单条弧找不到绑定时返回空列表；候选绑定中存在未绑定变量时跳过该候选；
    /// 表达式求值错误向上传播。
    pub fn modes(&self, net: &PetriNet) -> NetResult<Vec<Substitution>> {
        let env = net.env();
        let mut parts = Vec::with_capacity(self.inputs.len());
        for (name, label) in &self.inputs {
            match label.modes(net.place(name)?.tokens(), env) {
                Ok(modes) => parts.push(modes),
                Err(err) if err.is_mode() => {
                    trace!("{}: no mode on input {} ({})", self.name, name, err);
                    return Ok(Vec::new());
                }
                Err(err) => return Err(err),
            }
        }
        let mut result = Vec::new();
        for candidate in combine(&parts) {
            match self.check(net, &candidate, false, false) {
                Ok(true) => result.push(candidate),
                Ok(false) | Err(NetError::Domain(_)) => {}
                Err(err) => return Err(err),
            }
        }
        Ok(result)
    }

    /// 激发的令牌流 `(消耗, 产生)`；绑定未使能时失败。
    pub fn flow(&self, net: &PetriNet, binding: &Substitution) -> NetResult<(Marking, Marking)> {
        if !self.enabled(net, binding)? {
            return Err(FiringError::NotEnabled {
                transition: self.name.clone(),
                binding: binding.to_string(),
            }
            .into());
        }
        let env = net.env();
        let consumed = self
            .inputs
            .iter()
            .map(|(place, label)| -> NetResult<_> { Ok((place.as_str(), label.flow(binding, env)?)) })
            .collect::<NetResult<Vec<_>>>()?
            .into_iter()
            .collect();
        let produced = self
            .outputs
            .iter()
            .map(|(place, label)| -> NetResult<_> { Ok((place.as_str(), label.flow(binding, env)?)) })
            .collect::<NetResult<Vec<_>>>()?
            .into_iter()
            .collect();
        Ok((consumed, produced))
    }
}
