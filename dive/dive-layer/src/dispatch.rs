//! Per-instance and per-device dispatch tables, grounded on
//! `original_source/layer/dispatch.h` (`InstanceDispatchTable`) and
//! `original_source/runtime_layer/vk_rt_dispatch.h` (`DeviceDispatchTable`,
//! `InitInstanceDispatchTable`, `InitDeviceDispatchTable`).

use std::ffi::CStr;

use ash::vk;

macro_rules! cstr {
    ($s:literal) => {
        unsafe { CStr::from_bytes_with_nul_unchecked(concat!($s, "\0").as_bytes()) }
    };
}

/// The next layer/ICD's entry points this instance chains to.
pub struct InstanceDispatchTable {
    pub get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    pub create_device: vk::PFN_vkCreateDevice,
    pub enumerate_device_layer_properties: vk::PFN_vkEnumerateDeviceLayerProperties,
    pub enumerate_device_extension_properties: vk::PFN_vkEnumerateDeviceExtensionProperties,
}

impl InstanceDispatchTable {
    /// # Safety
    /// `instance` must be a valid `VkInstance` and `get_instance_proc_addr`
    /// must be the next layer/loader's real entry point.
    pub unsafe fn load(
        instance: vk::Instance,
        get_instance_proc_addr: vk::PFN_vkGetInstanceProcAddr,
    ) -> Self {
        let load = |name: &CStr| get_instance_proc_addr(instance, name.as_ptr());
        Self {
            get_instance_proc_addr,
            create_device: std::mem::transmute(load(cstr!("vkCreateDevice"))),
            enumerate_device_layer_properties: std::mem::transmute(load(cstr!(
                "vkEnumerateDeviceLayerProperties"
            ))),
            enumerate_device_extension_properties: std::mem::transmute(load(cstr!(
                "vkEnumerateDeviceExtensionProperties"
            ))),
        }
    }
}

/// The next layer/ICD's entry points this device chains to. Field set
/// mirrors `vk_rt_dispatch.h`'s `DeviceDispatchTable`.
pub struct DeviceDispatchTable {
    pub get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    pub queue_present_khr: vk::PFN_vkQueuePresentKHR,
    pub create_image: vk::PFN_vkCreateImage,
    pub cmd_draw_indexed: vk::PFN_vkCmdDrawIndexed,
    pub cmd_reset_query_pool: vk::PFN_vkCmdResetQueryPool,
    pub cmd_write_timestamp: vk::PFN_vkCmdWriteTimestamp,
    pub get_query_pool_results: vk::PFN_vkGetQueryPoolResults,
    pub create_query_pool: vk::PFN_vkCreateQueryPool,
    pub destroy_query_pool: vk::PFN_vkDestroyQueryPool,
    pub destroy_command_pool: vk::PFN_vkDestroyCommandPool,
    pub allocate_command_buffers: vk::PFN_vkAllocateCommandBuffers,
    pub free_command_buffers: vk::PFN_vkFreeCommandBuffers,
    pub reset_command_buffer: vk::PFN_vkResetCommandBuffer,
    pub reset_command_pool: vk::PFN_vkResetCommandPool,
    pub begin_command_buffer: vk::PFN_vkBeginCommandBuffer,
    pub end_command_buffer: vk::PFN_vkEndCommandBuffer,
    pub acquire_next_image_khr: vk::PFN_vkAcquireNextImageKHR,
    pub queue_submit: vk::PFN_vkQueueSubmit,
    pub queue_wait_idle: vk::PFN_vkQueueWaitIdle,
    pub get_device_queue: vk::PFN_vkGetDeviceQueue,
    pub get_device_queue2: vk::PFN_vkGetDeviceQueue2,
    pub destroy_device: vk::PFN_vkDestroyDevice,
    pub cmd_insert_debug_utils_label: Option<vk::PFN_vkCmdInsertDebugUtilsLabelEXT>,
}

impl DeviceDispatchTable {
    /// # Safety
    /// `device` must be a valid `VkDevice` and `get_device_proc_addr` must be
    /// the next layer/loader's real entry point.
    pub unsafe fn load(
        device: vk::Device,
        get_device_proc_addr: vk::PFN_vkGetDeviceProcAddr,
    ) -> Self {
        let load = |name: &CStr| get_device_proc_addr(device, name.as_ptr());
        let label_fn = load(cstr!("vkCmdInsertDebugUtilsLabelEXT"));
        Self {
            get_device_proc_addr,
            queue_present_khr: std::mem::transmute(load(cstr!("vkQueuePresentKHR"))),
            create_image: std::mem::transmute(load(cstr!("vkCreateImage"))),
            cmd_draw_indexed: std::mem::transmute(load(cstr!("vkCmdDrawIndexed"))),
            cmd_reset_query_pool: std::mem::transmute(load(cstr!("vkCmdResetQueryPool"))),
            cmd_write_timestamp: std::mem::transmute(load(cstr!("vkCmdWriteTimestamp"))),
            get_query_pool_results: std::mem::transmute(load(cstr!("vkGetQueryPoolResults"))),
            create_query_pool: std::mem::transmute(load(cstr!("vkCreateQueryPool"))),
            destroy_query_pool: std::mem::transmute(load(cstr!("vkDestroyQueryPool"))),
            destroy_command_pool: std::mem::transmute(load(cstr!("vkDestroyCommandPool"))),
            allocate_command_buffers: std::mem::transmute(load(cstr!(
                "vkAllocateCommandBuffers"
            ))),
            free_command_buffers: std::mem::transmute(load(cstr!("vkFreeCommandBuffers"))),
            reset_command_buffer: std::mem::transmute(load(cstr!("vkResetCommandBuffer"))),
            reset_command_pool: std::mem::transmute(load(cstr!("vkResetCommandPool"))),
            begin_command_buffer: std::mem::transmute(load(cstr!("vkBeginCommandBuffer"))),
            end_command_buffer: std::mem::transmute(load(cstr!("vkEndCommandBuffer"))),
            acquire_next_image_khr: std::mem::transmute(load(cstr!("vkAcquireNextImageKHR"))),
            queue_submit: std::mem::transmute(load(cstr!("vkQueueSubmit"))),
            queue_wait_idle: std::mem::transmute(load(cstr!("vkQueueWaitIdle"))),
            get_device_queue: std::mem::transmute(load(cstr!("vkGetDeviceQueue"))),
            get_device_queue2: std::mem::transmute(load(cstr!("vkGetDeviceQueue2"))),
            destroy_device: std::mem::transmute(load(cstr!("vkDestroyDevice"))),
            cmd_insert_debug_utils_label: label_fn.map(|f| std::mem::transmute(f)),
        }
    }
}
