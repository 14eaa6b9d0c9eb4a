//! Per-instance and per-device context registries, keyed by the loader's
//! dispatch key (see [`crate::loader::dispatch_key`]). Grounded on
//! `original_source/runtime_layer/vk_rt_layer_base.cc`'s anonymous namespace:
//! a global mutex-guarded map plus a `thread_local` one-entry cache
//! (`last_used_instance_data`/`last_used_device_data`) for the common case
//! of a thread repeatedly calling into the same instance/device.

use std::cell::RefCell;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use parking_lot::Mutex as PlMutex;

use crate::dispatch::{DeviceDispatchTable, InstanceDispatchTable};
use dive_gputime::GpuTimeTracker;

use crate::drawcall::DrawcallCounters;

pub struct InstanceData {
    pub dispatch: InstanceDispatchTable,
}

pub struct DeviceData {
    pub device: ash::vk::Device,
    pub dispatch: DeviceDispatchTable,
    pub tracker: PlMutex<GpuTimeTracker>,
    pub drawcalls: PlMutex<DrawcallCounters>,
    pub query_pool: PlMutex<Option<ash::vk::QueryPool>>,
}

static INSTANCES: Mutex<Option<HashMap<usize, Arc<InstanceData>>>> = Mutex::new(None);
static DEVICES: Mutex<Option<HashMap<usize, Arc<DeviceData>>>> = Mutex::new(None);

thread_local! {
    static LAST_INSTANCE: RefCell<Option<(usize, Arc<InstanceData>)>> = const { RefCell::new(None) };
    static LAST_DEVICE: RefCell<Option<(usize, Arc<DeviceData>)>> = const { RefCell::new(None) };
}

pub fn register_instance(key: usize, data: InstanceData) {
    let arc = Arc::new(data);
    INSTANCES
        .lock()
        .unwrap()
        .get_or_insert_with(HashMap::new)
        .insert(key, arc.clone());
    LAST_INSTANCE.with(|c| *c.borrow_mut() = Some((key, arc)));
}

pub fn unregister_instance(key: usize) {
    if let Some(map) = INSTANCES.lock().unwrap().as_mut() {
        map.remove(&key);
    }
    LAST_INSTANCE.with(|c| {
        if c.borrow().as_ref().is_some_and(|(k, _)| *k == key) {
            *c.borrow_mut() = None;
        }
    });
}

pub fn instance_data(key: usize) -> Option<Arc<InstanceData>> {
    if let Some(hit) = LAST_INSTANCE.with(|c| {
        c.borrow()
            .as_ref()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    }) {
        return Some(hit);
    }
    let found = INSTANCES.lock().unwrap().as_ref()?.get(&key).cloned();
    if let Some(data) = &found {
        LAST_INSTANCE.with(|c| *c.borrow_mut() = Some((key, data.clone())));
    }
    found
}

pub fn register_device(key: usize, data: DeviceData) {
    let arc = Arc::new(data);
    DEVICES
        .lock()
        .unwrap()
        .get_or_insert_with(HashMap::new)
        .insert(key, arc.clone());
    LAST_DEVICE.with(|c| *c.borrow_mut() = Some((key, arc)));
}

pub fn unregister_device(key: usize) {
    if let Some(map) = DEVICES.lock().unwrap().as_mut() {
        map.remove(&key);
    }
    LAST_DEVICE.with(|c| {
        if c.borrow().as_ref().is_some_and(|(k, _)| *k == key) {
            *c.borrow_mut() = None;
        }
    });
}

pub fn device_data(key: usize) -> Option<Arc<DeviceData>> {
    if let Some(hit) = LAST_DEVICE.with(|c| {
        c.borrow()
            .as_ref()
            .filter(|(k, _)| *k == key)
            .map(|(_, v)| v.clone())
    }) {
        return Some(hit);
    }
    let found = DEVICES.lock().unwrap().as_ref()?.get(&key).cloned();
    if let Some(data) = &found {
        LAST_DEVICE.with(|c| *c.borrow_mut() = Some((key, data.clone())));
    }
    found
}

#[cfg(test)]
mod tests {
    use super::*;

    fn instance_data_stub() -> InstanceData {
        InstanceData {
            dispatch: InstanceDispatchTable {
                get_instance_proc_addr: stub_get_instance_proc_addr,
                create_device: unsafe { std::mem::zeroed() },
                enumerate_device_layer_properties: unsafe { std::mem::zeroed() },
                enumerate_device_extension_properties: unsafe { std::mem::zeroed() },
            },
        }
    }

    unsafe extern "system" fn stub_get_instance_proc_addr(
        _instance: ash::vk::Instance,
        _name: *const std::os::raw::c_char,
    ) -> ash::vk::PFN_vkVoidFunction {
        None
    }

    #[test]
    fn register_then_lookup_round_trips() {
        let key: usize = 0xdead_beef;
        register_instance(key, instance_data_stub());
        assert!(instance_data(key).is_some());
        unregister_instance(key);
        assert!(instance_data(key).is_none());
    }

    #[test]
    fn lookup_of_unregistered_key_is_none() {
        assert!(instance_data(0x1234).is_none());
    }
}
