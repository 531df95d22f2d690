// SPDX-License-Identifier: PolyForm-Noncommercial-1.0.0
// Copyright (c) 2025 Sylvex. All rights reserved.

//! # Test Fixtures
//!
//! Canonical source trees seeded into a [`MemoryAddressSpace`].

use std::sync::Arc;

use mira_core::memory::MemoryAddressSpace;
use mira_core::session::TargetSession;
use mira_core::types::{NodeId, Value};

/// The canonical `Objects/Device1{temp=20}` scenario tree.
pub struct DeviceTree {
    /// The address space holding the tree.
    pub space: Arc<MemoryAddressSpace>,
    /// Root (Objects folder).
    pub root: NodeId,
    /// `Device1` object.
    pub device: NodeId,
    /// `temp` variable, initially 20.
    pub temp: NodeId,
}

impl DeviceTree {
    /// Seeds the scenario tree into a fresh address space.
    pub async fn seed() -> Self {
        let space = Arc::new(MemoryAddressSpace::new());
        let root = space.root_id();
        let device = space.create_object(&root, "Device1").await.unwrap();
        let temp = space
            .create_variable(&device, "temp", Some(Value::Int32(20)))
            .await
            .unwrap();

        Self {
            space,
            root,
            device,
            temp,
        }
    }
}

/// A linear chain `Objects -> n1 -> n2 -> ... -> n_depth`.
pub struct ChainTree {
    /// The address space holding the chain.
    pub space: Arc<MemoryAddressSpace>,
    /// Root (Objects folder).
    pub root: NodeId,
    /// Chain nodes, top to bottom.
    pub chain: Vec<NodeId>,
}

impl ChainTree {
    /// Seeds a chain of `depth` objects.
    pub async fn seed(depth: usize) -> Self {
        let space = Arc::new(MemoryAddressSpace::new());
        let root = space.root_id();

        let mut chain = Vec::with_capacity(depth);
        let mut parent = root.clone();
        for level in 0..depth {
            let node = space
                .create_object(&parent, format!("level{}", level).as_str())
                .await
                .unwrap();
            chain.push(node.clone());
            parent = node;
        }

        Self { space, root, chain }
    }
}

/// A wide tree: `fanout` devices under the root, one variable each.
pub struct WideTree {
    /// The address space holding the tree.
    pub space: Arc<MemoryAddressSpace>,
    /// Root (Objects folder).
    pub root: NodeId,
    /// Device objects, in creation order.
    pub devices: Vec<NodeId>,
    /// One variable per device, same order.
    pub variables: Vec<NodeId>,
}

impl WideTree {
    /// Seeds `fanout` devices with one variable each.
    pub async fn seed(fanout: usize) -> Self {
        let space = Arc::new(MemoryAddressSpace::new());
        let root = space.root_id();

        let mut devices = Vec::with_capacity(fanout);
        let mut variables = Vec::with_capacity(fanout);
        for n in 0..fanout {
            let device = space
                .create_object(&root, format!("Device{}", n).as_str())
                .await
                .unwrap();
            let variable = space
                .create_variable(&device, "value", Some(Value::Int64(n as i64)))
                .await
                .unwrap();
            devices.push(device);
            variables.push(variable);
        }

        Self {
            space,
            root,
            devices,
            variables,
        }
    }
}

/// A cyclic graph: `Objects -> A -> B` plus a `B -> A` back-edge.
pub struct CyclicTree {
    /// The address space holding the graph.
    pub space: Arc<MemoryAddressSpace>,
    /// Root (Objects folder).
    pub root: NodeId,
    /// Node `A`, pointed back to by `B`.
    pub a: NodeId,
    /// Node `B`.
    pub b: NodeId,
}

impl CyclicTree {
    /// Seeds the cyclic graph.
    pub async fn seed() -> Self {
        let space = Arc::new(MemoryAddressSpace::new());
        let root = space.root_id();
        let a = space.create_object(&root, "A").await.unwrap();
        let b = space.create_object(&a, "B").await.unwrap();
        space.link_child(&b, &a);

        Self { space, root, a, b }
    }
}
