//! Hand-written bridges for UnityEngine calls whose struct arguments and
//! returns do not marshal through the generic invoke path

use super::values::array_index;
use super::{guard, non_null, write_c_buffer};
use crate::error::{Error, Result};
use crate::il2cpp::runtime::require;
use crate::il2cpp::{runtime, structs, Il2CppRuntime};
use std::collections::HashMap;
use std::ffi::c_void;
use std::os::raw::c_char;
use std::ptr;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;
use tracing::debug;

const CORE_MODULE: &str = "UnityEngine.CoreModule";

#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Vector3 {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// `UnityEngine.SceneManagement.Scene` is a struct holding one handle.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Scene {
    pub handle: i32,
}

static METHODS: Mutex<Option<HashMap<(&'static str, &'static str, i32), usize>>> = Mutex::new(None);
static DONT_DESTROY_SCENE: AtomicI32 = AtomicI32::new(0);

struct Unity {
    rt: &'static Il2CppRuntime,
}

impl Unity {
    fn get() -> Result<Self> {
        let rt = runtime()?;
        rt.attach_current_thread()?;
        Ok(Unity { rt })
    }

    fn class(&self, namespace: &str, name: &str) -> Result<*mut c_void> {
        self.rt
            .find_class(CORE_MODULE, namespace, name)
            .or_else(|_| self.rt.find_class_anywhere(namespace, name))
    }

    /// `Class.method` with `argc` parameters, cached for the process lifetime.
    fn method(&self, class: &'static str, name: &'static str, argc: i32) -> Result<*const c_void> {
        let (namespace, simple) = match class.rsplit_once('.') {
            Some((ns, n)) => (ns, n),
            None => ("", class),
        };
        let mut cache = METHODS.lock().unwrap_or_else(|e| e.into_inner());
        let cache = cache.get_or_insert_with(HashMap::new);
        if let Some(&m) = cache.get(&(class, name, argc)) {
            return Ok(m as *const c_void);
        }
        let klass = self.class(namespace, simple)?;
        let method = self.rt.find_method(klass, name, argc)?;
        debug!("Resolved {}.{}({}) at {:p}", class, name, argc, method);
        cache.insert((class, name, argc), method as usize);
        Ok(method)
    }

    fn call(
        &self,
        class: &'static str,
        name: &'static str,
        instance: *mut c_void,
        args: &mut [*mut c_void],
    ) -> Result<*mut c_void> {
        let method = self.method(class, name, args.len() as i32)?;
        let mut exception = ptr::null_mut();
        let argv = if args.is_empty() { ptr::null_mut() } else { args.as_mut_ptr() };
        self.rt.invoke(method, instance, argv, &mut exception)
    }

    /// Read a value type out of a boxed return.
    fn unboxed<T: Copy>(&self, boxed: *mut c_void) -> Result<T> {
        if boxed.is_null() {
            return Err(Error::InvocationFailed("call returned no value".into()));
        }
        Ok(unsafe { ptr::read_unaligned(structs::unbox(boxed) as *const T) })
    }

    fn scene_at(&self, index: i32) -> Result<Scene> {
        let mut index = index;
        let boxed = self.call(
            "UnityEngine.SceneManagement.SceneManager",
            "GetSceneAt",
            ptr::null_mut(),
            &mut [&mut index as *mut i32 as *mut c_void],
        )?;
        self.unboxed(boxed)
    }

    fn vector_get(&self, transform: *mut c_void, getter: &'static str) -> Result<Vector3> {
        let boxed = self.call("UnityEngine.Transform", getter, transform, &mut [])?;
        self.unboxed(boxed)
    }

    fn vector_set(&self, transform: *mut c_void, setter: &'static str, value: Vector3) -> Result<()> {
        let mut value = value;
        self.call(
            "UnityEngine.Transform",
            setter,
            transform,
            &mut [&mut value as *mut Vector3 as *mut c_void],
        )?;
        Ok(())
    }
}

/// `Component[]` attached to a GameObject.
#[no_mangle]
pub extern "C" fn mdb_gameobject_get_components(game_object: *mut c_void) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let game_object = non_null(game_object, "gameObject")?;
        let unity = Unity::get()?;
        let component = unity.class("UnityEngine", "Component")?;
        let class_get_type = require(unity.rt.exports().class_get_type, "il2cpp_class_get_type")?;
        let ty = unsafe { class_get_type(component) };
        let type_object = crate::backend::TypeHandle::from_ptr(ty)
            .and_then(|t| unity.rt.type_object(t))
            .ok_or(Error::InvalidClass)?;
        unity.call("UnityEngine.GameObject", "GetComponents", game_object, &mut [type_object])
    })
}

#[no_mangle]
pub extern "C" fn mdb_components_array_length(components: *mut c_void) -> i32 {
    guard(-1, || {
        let components = non_null(components, "components")?;
        Ok(unsafe { structs::array_length(components) } as i32)
    })
}

#[no_mangle]
pub extern "C" fn mdb_components_array_get(components: *mut c_void, index: i32) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let components = non_null(components, "components")?;
        let index = array_index(components, index)?;
        Ok(unsafe { structs::array_ref_element(components, index) })
    })
}

#[no_mangle]
pub extern "C" fn mdb_gameobject_set_active(game_object: *mut c_void, active: bool) -> bool {
    guard(false, || {
        let game_object = non_null(game_object, "gameObject")?;
        let mut active = active;
        Unity::get()?.call(
            "UnityEngine.GameObject",
            "SetActive",
            game_object,
            &mut [&mut active as *mut bool as *mut c_void],
        )?;
        Ok(true)
    })
}

#[no_mangle]
pub extern "C" fn mdb_gameobject_get_active_self(game_object: *mut c_void) -> bool {
    guard(false, || {
        let game_object = non_null(game_object, "gameObject")?;
        let unity = Unity::get()?;
        let boxed = unity.call("UnityEngine.GameObject", "get_activeSelf", game_object, &mut [])?;
        unity.unboxed::<bool>(boxed)
    })
}

#[no_mangle]
pub extern "C" fn mdb_gameobject_get_scene_handle(game_object: *mut c_void) -> i32 {
    guard(0, || {
        let game_object = non_null(game_object, "gameObject")?;
        let unity = Unity::get()?;
        let boxed = unity.call("UnityEngine.GameObject", "get_scene", game_object, &mut [])?;
        Ok(unity.unboxed::<Scene>(boxed)?.handle)
    })
}

#[no_mangle]
pub extern "C" fn mdb_transform_get_child_count(transform: *mut c_void) -> i32 {
    guard(-1, || {
        let transform = non_null(transform, "transform")?;
        let unity = Unity::get()?;
        let boxed = unity.call("UnityEngine.Transform", "get_childCount", transform, &mut [])?;
        unity.unboxed::<i32>(boxed)
    })
}

#[no_mangle]
pub extern "C" fn mdb_transform_get_child(transform: *mut c_void, index: i32) -> *mut c_void {
    guard(ptr::null_mut(), || {
        let transform = non_null(transform, "transform")?;
        let mut index = index;
        Unity::get()?.call(
            "UnityEngine.Transform",
            "GetChild",
            transform,
            &mut [&mut index as *mut i32 as *mut c_void],
        )
    })
}

unsafe fn write_vector(v: Vector3, x: *mut f32, y: *mut f32, z: *mut f32) -> Result<()> {
    let x = non_null(x, "outX")?;
    let y = non_null(y, "outY")?;
    let z = non_null(z, "outZ")?;
    *x = v.x;
    *y = v.y;
    *z = v.z;
    Ok(())
}

macro_rules! transform_vector {
    ($get:ident, $set:ident, $getter:literal, $setter:literal) => {
        #[no_mangle]
        pub unsafe extern "C" fn $get(transform: *mut c_void, x: *mut f32, y: *mut f32, z: *mut f32) -> bool {
            guard(false, || {
                let transform = non_null(transform, "transform")?;
                let v = Unity::get()?.vector_get(transform, $getter)?;
                write_vector(v, x, y, z)?;
                Ok(true)
            })
        }

        #[no_mangle]
        pub extern "C" fn $set(transform: *mut c_void, x: f32, y: f32, z: f32) -> bool {
            guard(false, || {
                let transform = non_null(transform, "transform")?;
                Unity::get()?.vector_set(transform, $setter, Vector3 { x, y, z })?;
                Ok(true)
            })
        }
    };
}

transform_vector!(
    mdb_transform_get_local_position,
    mdb_transform_set_local_position,
    "get_localPosition",
    "set_localPosition"
);
transform_vector!(
    mdb_transform_get_local_euler_angles,
    mdb_transform_set_local_euler_angles,
    "get_localEulerAngles",
    "set_localEulerAngles"
);
transform_vector!(
    mdb_transform_get_local_scale,
    mdb_transform_set_local_scale,
    "get_localScale",
    "set_localScale"
);

#[no_mangle]
pub extern "C" fn mdb_scenemanager_get_scene_count() -> i32 {
    guard(-1, || {
        let unity = Unity::get()?;
        let boxed = unity.call(
            "UnityEngine.SceneManagement.SceneManager",
            "get_sceneCount",
            ptr::null_mut(),
            &mut [],
        )?;
        unity.unboxed::<i32>(boxed)
    })
}

/// Name of the scene at `scene_index`. Returns the bytes written.
#[no_mangle]
pub unsafe extern "C" fn mdb_scenemanager_get_scene_name(scene_index: i32, buffer: *mut c_char, buffer_size: i32) -> i32 {
    guard(-1, || {
        let unity = Unity::get()?;
        let mut scene = unity.scene_at(scene_index)?;
        // struct instance methods take a pointer to the value itself
        let name = unity.call(
            "UnityEngine.SceneManagement.Scene",
            "get_name",
            &mut scene as *mut Scene as *mut c_void,
            &mut [],
        )?;
        let text = if name.is_null() { String::new() } else { structs::read_string(name) };
        write_c_buffer(&text, buffer, buffer_size)
    })
}

#[no_mangle]
pub extern "C" fn mdb_scenemanager_get_scene_handle(scene_index: i32) -> i32 {
    guard(0, || Ok(Unity::get()?.scene_at(scene_index)?.handle))
}

#[no_mangle]
pub extern "C" fn mdb_scenemanager_get_scene_root_count(scene_index: i32) -> i32 {
    guard(-1, || {
        let unity = Unity::get()?;
        let mut scene = unity.scene_at(scene_index)?;
        let boxed = unity.call(
            "UnityEngine.SceneManagement.Scene",
            "get_rootCount",
            &mut scene as *mut Scene as *mut c_void,
            &mut [],
        )?;
        unity.unboxed::<i32>(boxed)
    })
}

/// Handle of the DontDestroyOnLoad scene, found by parking a probe
/// GameObject there once.
#[no_mangle]
pub extern "C" fn mdb_get_dontdestroyonload_scene_handle() -> i32 {
    let cached = DONT_DESTROY_SCENE.load(Ordering::Acquire);
    if cached != 0 {
        return cached;
    }
    guard(0, || {
        let unity = Unity::get()?;
        let class = unity.class("UnityEngine", "GameObject")?;
        let probe = unity.rt.object_new(class)?;
        unity.call("UnityEngine.GameObject", ".ctor", probe, &mut [])?;
        unity.call("UnityEngine.Object", "DontDestroyOnLoad", ptr::null_mut(), &mut [probe])?;
        let boxed = unity.call("UnityEngine.GameObject", "get_scene", probe, &mut [])?;
        let scene = unity.unboxed::<Scene>(boxed)?;
        unity.call("UnityEngine.Object", "DestroyImmediate", ptr::null_mut(), &mut [probe])?;
        DONT_DESTROY_SCENE.store(scene.handle, Ordering::Release);
        Ok(scene.handle)
    })
}
