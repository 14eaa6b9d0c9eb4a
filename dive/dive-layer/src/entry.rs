//! The layer's exported ABI surface: loader negotiation, the
//! `vkGet{Instance,Device}ProcAddr` trampolines, and the intercepted
//! `vkCreateInstance`/`vkCreateDevice` pair that installs dispatch tables.
//! Grounded on `original_source/runtime_layer/vk_rt_layer_base.cc`'s
//! `VK_LAYER_DiveGetInstanceProcAddr`/`VK_LAYER_DiveGetDeviceProcAddr`/
//! `VK_LAYER_DiveNegotiateLoaderLayerInterfaceVersion` and its
//! `DiveInterceptCreateInstance`/`DiveInterceptCreateDevice`.
#![allow(non_snake_case)]

use std::ffi::{c_char, CStr};

use ash::vk;
use parking_lot::Mutex as PlMutex;

use crate::dispatch::{DeviceDispatchTable, InstanceDispatchTable};
use crate::drawcall::DrawcallCounters;
use crate::loader::{self, VkNegotiateLayerInterface};
use crate::state::{self, DeviceData, InstanceData};

/// `VK_LAYER_Dive`.
pub const LAYER_NAME: &str = "VK_LAYER_Dive";
const LAYER_DESCRIPTION: &str = "Dive GPU profiling layer";
/// Instance-scope extensions this layer exposes, per the manifest in
/// SPEC_FULL.md's external-interfaces section.
pub const INSTANCE_EXTENSIONS: &[&str] = &["VK_EXT_debug_report", "VK_EXT_debug_utils"];
/// Device-scope extensions this layer exposes.
pub const DEVICE_EXTENSIONS: &[&str] = &["VK_EXT_debug_marker"];

unsafe fn name_matches(name: *const c_char, expected: &str) -> bool {
    CStr::from_ptr(name).to_bytes() == expected.as_bytes()
}

/// # Safety
/// Called by the Vulkan loader with a pointer to a live negotiation struct.
#[no_mangle]
pub unsafe extern "system" fn VK_LAYER_DiveNegotiateLoaderLayerInterfaceVersion(
    version_struct: *mut VkNegotiateLayerInterface,
) -> vk::Result {
    if version_struct.is_null() {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    }
    let s = &mut *version_struct;
    if s.s_type != loader::LAYER_NEGOTIATE_INTERFACE_STRUCT {
        tracing::error!("pVersionStruct must have type LAYER_NEGOTIATE_INTERFACE_STRUCT");
    }
    if s.loader_layer_interface_version >= 2 {
        s.pfn_get_instance_proc_addr = Some(VK_LAYER_DiveGetInstanceProcAddr);
        s.pfn_get_device_proc_addr = Some(VK_LAYER_DiveGetDeviceProcAddr);
        s.pfn_get_physical_device_proc_addr = std::ptr::null();
    }
    if s.loader_layer_interface_version > loader::LAYER_INTERFACE_VERSION {
        s.loader_layer_interface_version = loader::LAYER_INTERFACE_VERSION;
    }
    vk::Result::SUCCESS
}

/// # Safety
/// `instance`/`func` must come from the Vulkan loader.
#[no_mangle]
pub unsafe extern "system" fn VK_LAYER_DiveGetInstanceProcAddr(
    instance: vk::Instance,
    func: *const c_char,
) -> vk::PFN_vkVoidFunction {
    if name_matches(func, "vkGetInstanceProcAddr") {
        return Some(std::mem::transmute(
            VK_LAYER_DiveGetInstanceProcAddr as usize,
        ));
    }
    if name_matches(func, "vkCreateInstance") {
        return Some(std::mem::transmute(DiveInterceptCreateInstance as usize));
    }
    if name_matches(func, "vkEnumerateInstanceLayerProperties") {
        return Some(std::mem::transmute(
            DiveInterceptEnumerateInstanceLayerProperties as usize,
        ));
    }
    if name_matches(func, "vkEnumerateInstanceExtensionProperties") {
        return Some(std::mem::transmute(
            DiveInterceptEnumerateInstanceExtensionProperties as usize,
        ));
    }
    if instance == vk::Instance::null() {
        return None;
    }
    if name_matches(func, "vkGetDeviceProcAddr") {
        return Some(std::mem::transmute(VK_LAYER_DiveGetDeviceProcAddr as usize));
    }
    if name_matches(func, "vkCreateDevice") {
        return Some(std::mem::transmute(DiveInterceptCreateDevice as usize));
    }
    if name_matches(func, "vkEnumerateDeviceLayerProperties") {
        return Some(std::mem::transmute(
            DiveInterceptEnumerateDeviceLayerProperties as usize,
        ));
    }
    if name_matches(func, "vkEnumerateDeviceExtensionProperties") {
        return Some(std::mem::transmute(
            DiveInterceptEnumerateDeviceExtensionProperties as usize,
        ));
    }
    // vkCmdInsertDebugUtilsLabelEXT is occasionally looked up through the
    // instance even though it is a device-level function.
    if name_matches(func, "vkCmdInsertDebugUtilsLabelEXT") {
        return Some(std::mem::transmute(
            DiveInterceptCmdInsertDebugUtilsLabel as usize,
        ));
    }
    let Some(data) = state::instance_data(loader::dispatch_key(instance)) else {
        return None;
    };
    (data.dispatch.get_instance_proc_addr)(instance, func)
}

/// # Safety
/// `device`/`func` must come from the Vulkan loader.
#[no_mangle]
pub unsafe extern "system" fn VK_LAYER_DiveGetDeviceProcAddr(
    device: vk::Device,
    func: *const c_char,
) -> vk::PFN_vkVoidFunction {
    macro_rules! intercept {
        ($name:literal, $f:ident) => {
            if name_matches(func, $name) {
                return Some(std::mem::transmute($f as usize));
            }
        };
    }
    intercept!("vkGetDeviceProcAddr", VK_LAYER_DiveGetDeviceProcAddr);
    intercept!("vkDestroyDevice", DiveInterceptDestroyDevice);
    intercept!("vkQueuePresentKHR", DiveInterceptQueuePresentKHR);
    intercept!("vkCreateImage", DiveInterceptCreateImage);
    intercept!("vkCmdDrawIndexed", DiveInterceptCmdDrawIndexed);
    intercept!("vkCmdResetQueryPool", DiveInterceptCmdResetQueryPool);
    intercept!("vkCmdWriteTimestamp", DiveInterceptCmdWriteTimestamp);
    intercept!("vkGetQueryPoolResults", DiveInterceptGetQueryPoolResults);
    intercept!("vkDestroyCommandPool", DiveInterceptDestroyCommandPool);
    intercept!(
        "vkAllocateCommandBuffers",
        DiveInterceptAllocateCommandBuffers
    );
    intercept!("vkFreeCommandBuffers", DiveInterceptFreeCommandBuffers);
    intercept!("vkResetCommandBuffer", DiveInterceptResetCommandBuffer);
    intercept!("vkResetCommandPool", DiveInterceptResetCommandPool);
    intercept!("vkBeginCommandBuffer", DiveInterceptBeginCommandBuffer);
    intercept!("vkEndCommandBuffer", DiveInterceptEndCommandBuffer);
    intercept!("vkAcquireNextImageKHR", DiveInterceptAcquireNextImageKHR);
    intercept!("vkQueueSubmit", DiveInterceptQueueSubmit);
    intercept!("vkGetDeviceQueue", DiveInterceptGetDeviceQueue);
    intercept!("vkGetDeviceQueue2", DiveInterceptGetDeviceQueue2);
    intercept!(
        "vkCmdInsertDebugUtilsLabelEXT",
        DiveInterceptCmdInsertDebugUtilsLabel
    );

    let Some(data) = state::device_data(loader::dispatch_key(device)) else {
        return None;
    };
    (data.dispatch.get_device_proc_addr)(device, func)
}

/// # Safety
/// Called by the loader/application with valid `VkInstanceCreateInfo`.
#[no_mangle]
pub unsafe extern "system" fn DiveInterceptCreateInstance(
    create_info: *const vk::InstanceCreateInfo,
    allocator: *const vk::AllocationCallbacks,
    instance: *mut vk::Instance,
) -> vk::Result {
    let Some(link_info) = loader::find_instance_link_info(create_info) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let next_get_instance_proc_addr = (*(*link_info).u.p_layer_info)
        .pfn_next_get_instance_proc_addr;
    (*link_info).u.p_layer_info = (*(*link_info).u.p_layer_info).next;

    let Some(get_instance_proc_addr) = next_get_instance_proc_addr else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let create_instance: vk::PFN_vkCreateInstance = std::mem::transmute(get_instance_proc_addr(
        vk::Instance::null(),
        c"vkCreateInstance".as_ptr(),
    ));

    let result = create_instance(create_info, allocator, instance);
    if result != vk::Result::SUCCESS {
        return result;
    }

    let dispatch = InstanceDispatchTable::load(*instance, get_instance_proc_addr);
    state::register_instance(
        loader::dispatch_key(*instance),
        InstanceData { dispatch },
    );
    vk::Result::SUCCESS
}

/// # Safety
/// Called by the loader/application with valid `VkDeviceCreateInfo`.
#[no_mangle]
pub unsafe extern "system" fn DiveInterceptCreateDevice(
    physical_device: vk::PhysicalDevice,
    create_info: *const vk::DeviceCreateInfo,
    allocator: *const vk::AllocationCallbacks,
    device: *mut vk::Device,
) -> vk::Result {
    let Some(link_info) = loader::find_device_link_info(create_info) else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let next_link = &*(*link_info).u.p_layer_info;
    let get_instance_proc_addr = next_link.pfn_next_get_instance_proc_addr;
    let get_device_proc_addr = next_link.pfn_next_get_device_proc_addr;
    (*link_info).u.p_layer_info = next_link.next;

    let (Some(get_instance_proc_addr), Some(get_device_proc_addr)) =
        (get_instance_proc_addr, get_device_proc_addr)
    else {
        return vk::Result::ERROR_INITIALIZATION_FAILED;
    };
    let create_device: vk::PFN_vkCreateDevice = std::mem::transmute(get_instance_proc_addr(
        vk::Instance::null(),
        c"vkCreateDevice".as_ptr(),
    ));

    let result = create_device(physical_device, create_info, allocator, device);
    if result != vk::Result::SUCCESS {
        return result;
    }

    let dispatch = DeviceDispatchTable::load(*device, get_device_proc_addr);

    let get_physical_device_properties: vk::PFN_vkGetPhysicalDeviceProperties =
        std::mem::transmute(get_instance_proc_addr(
            vk::Instance::null(),
            c"vkGetPhysicalDeviceProperties".as_ptr(),
        ));
    let mut properties = vk::PhysicalDeviceProperties::default();
    get_physical_device_properties(physical_device, &mut properties);
    let timestamp_period_ns = crate::intercept::timestamp_period_ns(&properties.limits);

    let pool_info = vk::QueryPoolCreateInfo {
        query_type: vk::QueryType::TIMESTAMP,
        query_count: QUERY_POOL_CAPACITY,
        ..Default::default()
    };
    let mut query_pool = vk::QueryPool::null();
    (dispatch.create_query_pool)(*device, &pool_info, std::ptr::null(), &mut query_pool);

    let mut tracker = dive_gputime::GpuTimeTracker::new();
    tracker.on_create_device(
        vk::Handle::as_raw(*device),
        timestamp_period_ns,
        QUERY_POOL_CAPACITY,
    );

    state::register_device(
        loader::dispatch_key(*device),
        DeviceData {
            device: *device,
            dispatch,
            tracker: PlMutex::new(tracker),
            drawcalls: PlMutex::new(DrawcallCounters::default()),
            query_pool: PlMutex::new(Some(query_pool)),
        },
    );
    vk::Result::SUCCESS
}

/// Query slots reserved for one frame's worth of begin/end timestamp pairs,
/// matching the original's fixed-size device query pool.
const QUERY_POOL_CAPACITY: u32 = 4096;

/// # Safety
/// `device` must be a live, layer-registered device.
#[no_mangle]
pub unsafe extern "system" fn DiveInterceptDestroyDevice(
    device: vk::Device,
    allocator: *const vk::AllocationCallbacks,
) {
    let key = loader::dispatch_key(device);
    if let Some(data) = state::device_data(key) {
        data.tracker.lock().on_destroy_device(vk::Handle::as_raw(device));
        if let Some(pool) = data.query_pool.lock().take() {
            (data.dispatch.destroy_query_pool)(device, pool, std::ptr::null());
        }
        (data.dispatch.destroy_device)(device, allocator);
    }
    state::unregister_device(key);
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptEnumerateInstanceLayerProperties(
    property_count: *mut u32,
    properties: *mut vk::LayerProperties,
) -> vk::Result {
    enumerate_one_layer_property(property_count, properties)
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptEnumerateDeviceLayerProperties(
    _physical_device: vk::PhysicalDevice,
    property_count: *mut u32,
    properties: *mut vk::LayerProperties,
) -> vk::Result {
    enumerate_one_layer_property(property_count, properties)
}

unsafe fn enumerate_one_layer_property(
    property_count: *mut u32,
    properties: *mut vk::LayerProperties,
) -> vk::Result {
    if properties.is_null() {
        *property_count = 1;
        return vk::Result::SUCCESS;
    }
    if *property_count < 1 {
        return vk::Result::INCOMPLETE;
    }
    let mut prop = vk::LayerProperties::default();
    write_fixed_cstr(&mut prop.layer_name, LAYER_NAME);
    write_fixed_cstr(&mut prop.description, LAYER_DESCRIPTION);
    prop.spec_version = vk::API_VERSION_1_1;
    prop.implementation_version = 1;
    *properties = prop;
    *property_count = 1;
    vk::Result::SUCCESS
}

unsafe fn write_fixed_cstr(dst: &mut [c_char], src: &str) {
    for b in dst.iter_mut() {
        *b = 0;
    }
    for (d, s) in dst.iter_mut().zip(src.as_bytes()) {
        *d = *s as c_char;
    }
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptEnumerateInstanceExtensionProperties(
    layer_name: *const c_char,
    property_count: *mut u32,
    properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    if !layer_name.is_null() && name_matches(layer_name, LAYER_NAME) {
        return enumerate_extensions(crate::entry::INSTANCE_EXTENSIONS, property_count, properties);
    }
    *property_count = 0;
    vk::Result::SUCCESS
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptEnumerateDeviceExtensionProperties(
    physical_device: vk::PhysicalDevice,
    layer_name: *const c_char,
    property_count: *mut u32,
    properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    if !layer_name.is_null() && name_matches(layer_name, LAYER_NAME) {
        return enumerate_extensions(DEVICE_EXTENSIONS, property_count, properties);
    }
    let _ = physical_device;
    *property_count = 0;
    vk::Result::SUCCESS
}

unsafe fn enumerate_extensions(
    names: &[&str],
    property_count: *mut u32,
    properties: *mut vk::ExtensionProperties,
) -> vk::Result {
    if properties.is_null() {
        *property_count = names.len() as u32;
        return vk::Result::SUCCESS;
    }
    let requested = *property_count as usize;
    let written = requested.min(names.len());
    for (i, name) in names.iter().take(written).enumerate() {
        let mut prop = vk::ExtensionProperties::default();
        write_fixed_cstr(&mut prop.extension_name, name);
        prop.spec_version = 1;
        *properties.add(i) = prop;
    }
    *property_count = written as u32;
    if written < names.len() {
        vk::Result::INCOMPLETE
    } else {
        vk::Result::SUCCESS
    }
}

macro_rules! with_device {
    ($device:expr, $data:ident, $body:block, $fallback:expr) => {{
        let key = loader::dispatch_key($device);
        match state::device_data(key) {
            Some($data) => $body,
            None => $fallback,
        }
    }};
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptQueuePresentKHR(
    queue: vk::Queue,
    present_info: *const vk::PresentInfoKHR,
) -> vk::Result {
    with_device!(
        queue,
        data,
        { (data.dispatch.queue_present_khr)(queue, present_info) },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptCreateImage(
    device: vk::Device,
    create_info: *const vk::ImageCreateInfo,
    allocator: *const vk::AllocationCallbacks,
    image: *mut vk::Image,
) -> vk::Result {
    with_device!(
        device,
        data,
        {
            let mut patched = *create_info;
            patched.flags = vk::ImageCreateFlags::from_raw(crate::intercept::masked_image_create_flags(
                crate::flags::flags(),
                create_info.as_ref().unwrap().flags.as_raw(),
            ));
            (data.dispatch.create_image)(device, &patched, allocator, image)
        },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptCmdDrawIndexed(
    command_buffer: vk::CommandBuffer,
    index_count: u32,
    instance_count: u32,
    first_index: u32,
    vertex_offset: i32,
    first_instance: u32,
) {
    with_device!(
        command_buffer,
        data,
        {
            let forward = crate::intercept::should_forward_draw_indexed(
                crate::flags::flags(),
                &mut data.drawcalls.lock(),
                index_count,
            );
            if forward {
                (data.dispatch.cmd_draw_indexed)(
                    command_buffer,
                    index_count,
                    instance_count,
                    first_index,
                    vertex_offset,
                    first_instance,
                );
            }
        },
        ()
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptCmdResetQueryPool(
    command_buffer: vk::CommandBuffer,
    query_pool: vk::QueryPool,
    first_query: u32,
    query_count: u32,
) {
    if crate::flags::flags().disable_timestamp {
        return;
    }
    with_device!(
        command_buffer,
        data,
        {
            (data.dispatch.cmd_reset_query_pool)(
                command_buffer,
                query_pool,
                first_query,
                query_count,
            )
        },
        ()
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptCmdWriteTimestamp(
    command_buffer: vk::CommandBuffer,
    pipeline_stage: vk::PipelineStageFlags,
    query_pool: vk::QueryPool,
    query: u32,
) {
    if crate::flags::flags().disable_timestamp {
        return;
    }
    with_device!(
        command_buffer,
        data,
        {
            (data.dispatch.cmd_write_timestamp)(command_buffer, pipeline_stage, query_pool, query)
        },
        ()
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptGetQueryPoolResults(
    device: vk::Device,
    query_pool: vk::QueryPool,
    first_query: u32,
    query_count: u32,
    data_size: usize,
    out_data: *mut core::ffi::c_void,
    stride: vk::DeviceSize,
    flags_: vk::QueryResultFlags,
) -> vk::Result {
    if crate::flags::flags().disable_timestamp {
        return vk::Result::SUCCESS;
    }
    with_device!(
        device,
        data,
        {
            (data.dispatch.get_query_pool_results)(
                device,
                query_pool,
                first_query,
                query_count,
                data_size,
                out_data,
                stride,
                flags_,
            )
        },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptCmdInsertDebugUtilsLabel(
    command_buffer: vk::CommandBuffer,
    label_info: *const vk::DebugUtilsLabelEXT,
) {
    with_device!(
        command_buffer,
        data,
        {
            if let Some(f) = data.dispatch.cmd_insert_debug_utils_label {
                f(command_buffer, label_info);
            }
            if !label_info.is_null() && !(*label_info).p_label_name.is_null() {
                let label = CStr::from_ptr((*label_info).p_label_name);
                crate::intercept::on_cmd_insert_debug_utils_label(
                    &data,
                    crate::flags::flags(),
                    vk::Handle::as_raw(command_buffer),
                    label,
                );
            }
        },
        ()
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptDestroyCommandPool(
    device: vk::Device,
    command_pool: vk::CommandPool,
    allocator: *const vk::AllocationCallbacks,
) {
    with_device!(
        device,
        data,
        {
            crate::intercept::on_destroy_command_pool(&data, vk::Handle::as_raw(command_pool));
            (data.dispatch.destroy_command_pool)(device, command_pool, allocator)
        },
        ()
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptAllocateCommandBuffers(
    device: vk::Device,
    allocate_info: *const vk::CommandBufferAllocateInfo,
    command_buffers: *mut vk::CommandBuffer,
) -> vk::Result {
    with_device!(
        device,
        data,
        {
            let result = (data.dispatch.allocate_command_buffers)(
                device,
                allocate_info,
                command_buffers,
            );
            if result == vk::Result::SUCCESS {
                let count = (*allocate_info).command_buffer_count as usize;
                let pool = vk::Handle::as_raw((*allocate_info).command_pool);
                let handles: Vec<u64> = (0..count)
                    .map(|i| vk::Handle::as_raw(*command_buffers.add(i)))
                    .collect();
                crate::intercept::on_allocate_command_buffers(&data, pool, &handles);
            }
            result
        },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptFreeCommandBuffers(
    device: vk::Device,
    command_pool: vk::CommandPool,
    command_buffer_count: u32,
    command_buffers: *const vk::CommandBuffer,
) {
    with_device!(
        device,
        data,
        {
            let handles: Vec<u64> = (0..command_buffer_count as usize)
                .map(|i| vk::Handle::as_raw(*command_buffers.add(i)))
                .collect();
            crate::intercept::on_free_command_buffers(&data, &handles);
            (data.dispatch.free_command_buffers)(
                device,
                command_pool,
                command_buffer_count,
                command_buffers,
            )
        },
        ()
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptResetCommandBuffer(
    command_buffer: vk::CommandBuffer,
    flags_: vk::CommandBufferResetFlags,
) -> vk::Result {
    with_device!(
        command_buffer,
        data,
        {
            crate::intercept::on_reset_command_buffer(&data, vk::Handle::as_raw(command_buffer));
            (data.dispatch.reset_command_buffer)(command_buffer, flags_)
        },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptResetCommandPool(
    device: vk::Device,
    command_pool: vk::CommandPool,
    flags_: vk::CommandPoolResetFlags,
) -> vk::Result {
    with_device!(
        device,
        data,
        {
            crate::intercept::on_reset_command_pool(&data, vk::Handle::as_raw(command_pool));
            (data.dispatch.reset_command_pool)(device, command_pool, flags_)
        },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptBeginCommandBuffer(
    command_buffer: vk::CommandBuffer,
    begin_info: *const vk::CommandBufferBeginInfo,
) -> vk::Result {
    with_device!(
        command_buffer,
        data,
        {
            let one_time_submit = (*begin_info)
                .flags
                .contains(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            let begin_index = crate::intercept::on_begin_command_buffer(
                &data,
                crate::flags::flags(),
                vk::Handle::as_raw(command_buffer),
                one_time_submit,
            );
            let result = (data.dispatch.begin_command_buffer)(command_buffer, begin_info);
            if result == vk::Result::SUCCESS {
                if let (Some(index), Some(pool)) = (begin_index, *data.query_pool.lock()) {
                    (data.dispatch.cmd_reset_query_pool)(command_buffer, pool, index, 2);
                    (data.dispatch.cmd_write_timestamp)(
                        command_buffer,
                        vk::PipelineStageFlags::TOP_OF_PIPE,
                        pool,
                        index,
                    );
                }
            }
            result
        },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptEndCommandBuffer(
    command_buffer: vk::CommandBuffer,
) -> vk::Result {
    with_device!(
        command_buffer,
        data,
        {
            let end_index = crate::intercept::on_end_command_buffer(
                &data,
                crate::flags::flags(),
                vk::Handle::as_raw(command_buffer),
            );
            if let (Some(index), Some(pool)) = (end_index, *data.query_pool.lock()) {
                (data.dispatch.cmd_write_timestamp)(
                    command_buffer,
                    vk::PipelineStageFlags::BOTTOM_OF_PIPE,
                    pool,
                    index,
                );
            }
            (data.dispatch.end_command_buffer)(command_buffer)
        },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptAcquireNextImageKHR(
    device: vk::Device,
    swapchain: vk::SwapchainKHR,
    timeout: u64,
    semaphore: vk::Semaphore,
    fence: vk::Fence,
    image_index: *mut u32,
) -> vk::Result {
    with_device!(
        device,
        data,
        {
            (data.dispatch.acquire_next_image_khr)(
                device,
                swapchain,
                timeout,
                semaphore,
                fence,
                image_index,
            )
        },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptQueueSubmit(
    queue: vk::Queue,
    submit_count: u32,
    submits: *const vk::SubmitInfo,
    fence: vk::Fence,
) -> vk::Result {
    with_device!(
        queue,
        data,
        {
            let mut submitted = Vec::new();
            for i in 0..submit_count as usize {
                let submit = &*submits.add(i);
                for j in 0..submit.command_buffer_count as usize {
                    submitted.push(vk::Handle::as_raw(*submit.p_command_buffers.add(j)));
                }
            }
            let result = (data.dispatch.queue_submit)(queue, submit_count, submits, fence);
            if result == vk::Result::SUCCESS {
                let outcome =
                    crate::intercept::on_queue_submit(&data, crate::flags::flags(), &submitted);
                if outcome.is_frame_boundary && !outcome.query_ranges.is_empty() {
                    if let Some(pool) = *data.query_pool.lock() {
                        (data.dispatch.queue_wait_idle)(queue);
                        let resolved: Vec<(u64, u64)> = outcome
                            .query_ranges
                            .iter()
                            .map(|&(begin, _end)| {
                                let mut ticks = [0u64; 2];
                                (data.dispatch.get_query_pool_results)(
                                    data.device,
                                    pool,
                                    begin,
                                    2,
                                    std::mem::size_of_val(&ticks),
                                    ticks.as_mut_ptr() as *mut core::ffi::c_void,
                                    std::mem::size_of::<u64>() as vk::DeviceSize,
                                    vk::QueryResultFlags::TYPE_64 | vk::QueryResultFlags::WAIT,
                                );
                                (ticks[0], ticks[1])
                            })
                            .collect();
                        crate::intercept::finish_frame(&data, &resolved);
                    }
                }
            }
            result
        },
        vk::Result::ERROR_DEVICE_LOST
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptGetDeviceQueue(
    device: vk::Device,
    queue_family_index: u32,
    queue_index: u32,
    queue: *mut vk::Queue,
) {
    with_device!(
        device,
        data,
        {
            (data.dispatch.get_device_queue)(device, queue_family_index, queue_index, queue);
            crate::intercept::on_get_device_queue(&data, vk::Handle::as_raw(*queue));
        },
        ()
    )
}

#[no_mangle]
pub unsafe extern "system" fn DiveInterceptGetDeviceQueue2(
    device: vk::Device,
    queue_info: *const vk::DeviceQueueInfo2,
    queue: *mut vk::Queue,
) {
    with_device!(
        device,
        data,
        {
            (data.dispatch.get_device_queue2)(device, queue_info, queue);
            crate::intercept::on_get_device_queue(&data, vk::Handle::as_raw(*queue));
        },
        ()
    )
}
