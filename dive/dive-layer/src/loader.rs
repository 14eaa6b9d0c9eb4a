//! Loader/layer ABI types from `vulkan/vk_layer.h`, which `ash` does not
//! bind (it targets `vulkan.h`/`vulkan_core.h`, the application-facing API;
//! `vk_layer.h` is a separate header for layer *implementers*). These are a
//! hand-written translation of the loader chain-walking structs, grounded
//! field-for-field on their use in
//! `original_source/runtime_layer/vk_rt_layer_base.cc`
//! (`GetLoaderInstanceInfo`, `GetLoaderDeviceInfo`,
//! `VK_LAYER_DiveNegotiateLoaderLayerInterfaceVersion`).

use ash::vk;

/// `VK_STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO`, not part of core Vulkan.
pub const STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO: i32 = 47;
/// `VK_STRUCTURE_TYPE_LOADER_DEVICE_CREATE_INFO`, not part of core Vulkan.
pub const STRUCTURE_TYPE_LOADER_DEVICE_CREATE_INFO: i32 = 48;

/// `VkLayerFunction_`.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VkLayerFunction {
    LayerLinkInfo = 0,
    LoaderDataCallback = 1,
    LayerDeviceInfo = 2,
}

#[repr(C)]
pub struct VkLayerInstanceLink {
    pub next: *mut VkLayerInstanceLink,
    pub pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub pfn_next_get_physical_device_proc_addr: *const core::ffi::c_void,
}

#[repr(C)]
pub union VkLayerInstanceCreateInfoUnion {
    pub p_layer_info: *mut VkLayerInstanceLink,
    pub pfn_set_instance_loader_data: *const core::ffi::c_void,
}

#[repr(C)]
pub struct VkLayerInstanceCreateInfo {
    pub s_type: i32,
    pub p_next: *const core::ffi::c_void,
    pub function: VkLayerFunction,
    pub u: VkLayerInstanceCreateInfoUnion,
}

#[repr(C)]
pub struct VkLayerDeviceLink {
    pub next: *mut VkLayerDeviceLink,
    pub pfn_next_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub pfn_next_get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
}

#[repr(C)]
pub union VkLayerDeviceCreateInfoUnion {
    pub p_layer_info: *mut VkLayerDeviceLink,
    pub pfn_set_device_loader_data: *const core::ffi::c_void,
}

#[repr(C)]
pub struct VkLayerDeviceCreateInfo {
    pub s_type: i32,
    pub p_next: *const core::ffi::c_void,
    pub function: VkLayerFunction,
    pub u: VkLayerDeviceCreateInfoUnion,
}

#[repr(C)]
struct ChainHeader {
    s_type: i32,
    p_next: *const ChainHeader,
}

/// Walks `pNext` looking for the next `VkLayerInstanceCreateInfo` whose
/// `function` is `VkLayerFunction::LayerLinkInfo`, exactly as
/// `GetLoaderInstanceInfo` does in the original.
///
/// # Safety
/// `create_info` must point to a valid `VkInstanceCreateInfo` whose `pNext`
/// chain (if any) is well-formed.
pub unsafe fn find_instance_link_info(
    create_info: *const vk::InstanceCreateInfo,
) -> Option<*mut VkLayerInstanceCreateInfo> {
    let mut node = (*create_info).p_next as *const ChainHeader;
    while !node.is_null() {
        if (*node).s_type == STRUCTURE_TYPE_LOADER_INSTANCE_CREATE_INFO {
            let candidate = node as *mut VkLayerInstanceCreateInfo;
            if (*candidate).function == VkLayerFunction::LayerLinkInfo {
                return Some(candidate);
            }
        }
        node = (*node).p_next;
    }
    None
}

/// Walks `pNext` looking for the next `VkLayerDeviceCreateInfo` whose
/// `function` is `VkLayerFunction::LayerLinkInfo`, exactly as
/// `GetLoaderDeviceInfo` does in the original.
///
/// # Safety
/// `create_info` must point to a valid `VkDeviceCreateInfo` whose `pNext`
/// chain (if any) is well-formed.
pub unsafe fn find_device_link_info(
    create_info: *const vk::DeviceCreateInfo,
) -> Option<*mut VkLayerDeviceCreateInfo> {
    let mut node = (*create_info).p_next as *const ChainHeader;
    while !node.is_null() {
        if (*node).s_type == STRUCTURE_TYPE_LOADER_DEVICE_CREATE_INFO {
            let candidate = node as *mut VkLayerDeviceCreateInfo;
            if (*candidate).function == VkLayerFunction::LayerLinkInfo {
                return Some(candidate);
            }
        }
        node = (*node).p_next;
    }
    None
}

/// `VK_LAYER_API_VERSION_2`, the only interface version this shell speaks.
pub const LAYER_INTERFACE_VERSION: u32 = 2;
/// `LAYER_NEGOTIATE_INTERFACE_STRUCT`.
pub const LAYER_NEGOTIATE_INTERFACE_STRUCT: i32 = 1;

#[repr(C)]
pub struct VkNegotiateLayerInterface {
    pub s_type: i32,
    pub p_next: *const core::ffi::c_void,
    pub loader_layer_interface_version: u32,
    pub pfn_get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub pfn_get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    pub pfn_get_physical_device_proc_addr: *const core::ffi::c_void,
}

/// The loader's dispatch key for a dispatchable handle: the first pointer
/// word of the object, which the Vulkan loader overwrites with its own
/// per-ICD dispatch table pointer on every dispatchable handle it hands
/// back (see the Vulkan-Loader `loader_set_dispatch` comment copied from
/// `original_source/runtime_layer/vk_rt_layer_base.cc`'s `DataKey`).
///
/// # Safety
/// `handle` must be non-null and point to a live dispatchable Vulkan
/// object.
pub unsafe fn dispatch_key<H: ash::vk::Handle>(handle: H) -> usize {
    let ptr = handle.as_raw() as *const usize;
    *ptr
}
