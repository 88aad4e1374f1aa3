//! In-memory kernel for exercising transactions without jail(2)
//!
//! Follows the kernel's rules closely enough for lifecycle tests: jids are
//! handed out in increasing order, `lastjid` scans walk them in order and end
//! with `ENOENT`, names are unique, and output bindings are filled in place.

use super::codec;
use super::ffi::{Jid, Kernel, Operation, failed};
use super::registry::ParamType;
use super::txn::{Direction, Transaction};
use super::types::ParamValue;
use crate::error::Result;
use nix::errno::Errno;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, Mutex};

#[derive(Debug)]
struct State {
    jails: BTreeMap<Jid, BTreeMap<String, ParamValue>>,
    next_jid: Jid,
    failures: Vec<(Operation, usize, Errno)>,
    corrupt: HashSet<String>,
    attached: Option<Jid>,
    calls: Vec<Operation>,
}

impl Default for State {
    fn default() -> Self {
        Self {
            jails: BTreeMap::new(),
            next_jid: 1,
            failures: Vec::new(),
            corrupt: HashSet::new(),
            attached: None,
            calls: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct MockKernel {
    state: Arc<Mutex<State>>,
}

impl MockKernel {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the `skip`-th upcoming call of `op` (0 is the next one)
    pub fn fail_nth(&self, op: Operation, skip: usize, errno: Errno) {
        self.state.lock().unwrap().failures.push((op, skip, errno));
    }

    /// Return an undecodable buffer whenever `name` is read back
    pub fn corrupt(&self, name: &str) {
        self.state.lock().unwrap().corrupt.insert(name.to_string());
    }

    /// Change a parameter behind the handle's back
    pub fn poke(&self, jid: Jid, name: &str, value: impl Into<ParamValue>) {
        let mut state = self.state.lock().unwrap();
        if let Some(params) = state.jails.get_mut(&jid) {
            params.insert(name.to_string(), value.into());
        }
    }

    pub fn param(&self, jid: Jid, name: &str) -> Option<ParamValue> {
        let state = self.state.lock().unwrap();
        state.jails.get(&jid).and_then(|p| p.get(name).cloned())
    }

    pub fn jids(&self) -> Vec<Jid> {
        self.state.lock().unwrap().jails.keys().copied().collect()
    }

    pub fn attached(&self) -> Option<Jid> {
        self.state.lock().unwrap().attached
    }

    pub fn calls(&self) -> Vec<Operation> {
        self.state.lock().unwrap().calls.clone()
    }
}

impl State {
    fn take_failure(&mut self, op: Operation) -> Option<Errno> {
        let mut hit = None;
        for (i, (fop, skip, errno)) in self.failures.iter_mut().enumerate() {
            if *fop != op {
                continue;
            }
            if *skip == 0 {
                hit = Some((i, *errno));
                break;
            }
            *skip -= 1;
        }
        hit.map(|(i, errno)| {
            self.failures.remove(i);
            errno
        })
    }

    fn find_name(&self, name: &str) -> Option<Jid> {
        self.jails
            .iter()
            .find(|(_, p)| p.get("name") == Some(&ParamValue::String(name.to_string())))
            .map(|(jid, _)| *jid)
    }

    fn create(&mut self, inputs: Vec<(&'static str, ParamValue)>) -> Result<Jid> {
        let op = Operation::Create;
        if !inputs.iter().any(|(n, _)| *n == "path") {
            return Err(failed(op, Errno::EINVAL, "path is required"));
        }

        let jid = self.next_jid;
        let mut params = BTreeMap::new();
        params.insert("name".to_string(), ParamValue::String(jid.to_string()));
        params.insert("parent".to_string(), ParamValue::Int(0));
        params.insert("cpuset.id".to_string(), ParamValue::Int(jid + 1));
        params.insert("ip4.addr".to_string(), ParamValue::Ipv4(vec![]));

        for (name, value) in inputs {
            if name == "jid" {
                continue;
            }
            if name == "name" {
                if let ParamValue::String(s) = &value {
                    if s.is_empty() {
                        continue;
                    }
                    if self.find_name(s).is_some() {
                        return Err(failed(op, Errno::EEXIST, format!("jail {} already exists", s)));
                    }
                }
            }
            params.insert(name.to_string(), value);
        }
        if !params.contains_key("host.hostname") {
            let name = params["name"].clone();
            params.insert("host.hostname".to_string(), name);
        }

        self.next_jid += 1;
        self.jails.insert(jid, params);
        Ok(jid)
    }

    fn update(&mut self, inputs: Vec<(&'static str, ParamValue)>) -> Result<Jid> {
        let op = Operation::Update;
        let jid = match inputs.iter().find(|(n, _)| *n == "jid") {
            Some((_, ParamValue::Int(jid))) => *jid,
            _ => return Err(failed(op, Errno::EINVAL, "jid is required")),
        };
        if !self.jails.contains_key(&jid) {
            return Err(failed(op, Errno::ENOENT, format!("jail {} not found", jid)));
        }

        for (name, value) in inputs {
            match name {
                "jid" => continue,
                "path" => return Err(failed(op, Errno::EINVAL, "path cannot be changed")),
                "name" => {
                    if let ParamValue::String(s) = &value {
                        if self.find_name(s).is_some_and(|other| other != jid) {
                            return Err(failed(op, Errno::EEXIST, "name in use"));
                        }
                    }
                }
                _ => {}
            }
            if let Some(params) = self.jails.get_mut(&jid) {
                params.insert(name.to_string(), value);
            }
        }
        Ok(jid)
    }

    fn resolve(&self, inputs: &[(&'static str, ParamValue)]) -> Result<Jid> {
        let op = Operation::Get;
        let lookup = |name: &str| inputs.iter().find(|(n, _)| *n == name).map(|(_, v)| v);

        if let Some(ParamValue::Int(last)) = lookup("lastjid") {
            return self
                .jails
                .range(last + 1..)
                .next()
                .map(|(jid, _)| *jid)
                .ok_or_else(|| failed(op, Errno::ENOENT, ""));
        }
        if let Some(ParamValue::Int(jid)) = lookup("jid") {
            return if self.jails.contains_key(jid) {
                Ok(*jid)
            } else {
                Err(failed(op, Errno::ENOENT, format!("jail {} not found", jid)))
            };
        }
        if let Some(ParamValue::String(name)) = lookup("name") {
            return self
                .find_name(name)
                .ok_or_else(|| failed(op, Errno::ENOENT, format!("jail \"{}\" not found", name)));
        }
        Err(failed(op, Errno::ENOENT, "no jail specified"))
    }

    fn get(&mut self, txn: &mut Transaction) -> Result<Jid> {
        let jid = self.resolve(&inputs(txn)?)?;
        let params = &self.jails[&jid];

        for binding in txn.bindings_mut() {
            if binding.direction() == Direction::InputOutput && binding.name() != "jid" {
                continue;
            }
            let desc = binding.descriptor();

            let bytes = if self.corrupt.contains(desc.name) {
                match desc.kind {
                    ParamType::Integer => vec![0xff],
                    ParamType::String => vec![0xff, 0],
                    ParamType::Boolean => vec![],
                    ParamType::IpAddress | ParamType::IpAddressList => vec![0xff; 5],
                }
            } else {
                let value = match desc.name {
                    "jid" => ParamValue::Int(jid),
                    name => params.get(name).cloned().unwrap_or(match desc.kind {
                        ParamType::Integer => ParamValue::Int(0),
                        ParamType::String => ParamValue::String(String::new()),
                        ParamType::Boolean => ParamValue::Bool(false),
                        ParamType::IpAddress | ParamType::IpAddressList => {
                            ParamValue::Ipv4(vec![])
                        }
                    }),
                };
                codec::encode(desc, &value)?
            };

            let buf = binding.buffer_mut();
            if bytes.len() > buf.len() {
                return Err(failed(Operation::Get, Errno::EINVAL, "buffer too small"));
            }
            buf.clear();
            buf.extend_from_slice(&bytes);
        }
        Ok(jid)
    }
}

fn inputs(txn: &Transaction) -> Result<Vec<(&'static str, ParamValue)>> {
    txn.bindings()
        .iter()
        .filter(|b| b.direction() == Direction::InputOutput)
        .map(|b| Ok((b.name(), codec::decode(b.descriptor(), b.value())?)))
        .collect()
}

impl Kernel for MockKernel {
    fn call(&self, op: Operation, txn: &mut Transaction) -> Result<Jid> {
        let mut state = self.state.lock().unwrap();
        state.calls.push(op);

        if let Some(errno) = state.take_failure(op) {
            return Err(failed(op, errno, "injected failure"));
        }

        match op {
            Operation::Create => state.create(inputs(txn)?),
            Operation::Update => state.update(inputs(txn)?),
            Operation::Get => state.get(txn),
            Operation::Remove => {
                let jid = txn.grab::<Jid>("jid")?;
                state
                    .jails
                    .remove(&jid)
                    .map(|_| jid)
                    .ok_or_else(|| failed(op, Errno::ENOENT, ""))
            }
            Operation::Attach => {
                let jid = txn.grab::<Jid>("jid")?;
                if !state.jails.contains_key(&jid) {
                    return Err(failed(op, Errno::EINVAL, ""));
                }
                state.attached = Some(jid);
                Ok(jid)
            }
        }
    }
}
