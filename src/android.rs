// Android glue - JNI entry points and the ndk-context handshake oboe needs

use std::ffi::c_void;
use std::sync::atomic::{AtomicBool, Ordering};

use jni::objects::{JClass, JObject};
use jni::sys::{jint, JNI_ERR, JNI_OK, JNI_VERSION_1_6};
use jni::{JNIEnv, JavaVM};

static CONTEXT_READY: AtomicBool = AtomicBool::new(false);

/// True once the application context has been handed to ndk-context
pub fn context_ready() -> bool {
    CONTEXT_READY.load(Ordering::Acquire)
}

/// Called by the runtime when the library is loaded
#[no_mangle]
pub extern "system" fn JNI_OnLoad(_vm: JavaVM, _reserved: *mut c_void) -> jint {
    crate::init_logging(tracing::Level::DEBUG);
    tracing::info!("JNI_OnLoad called");
    JNI_VERSION_1_6
}

/// `ClapToFind.nativeInit(Context)` - must run before the first capture
#[no_mangle]
pub extern "system" fn Java_com_claptofind_ClapToFind_nativeInit(
    env: JNIEnv,
    _class: JClass,
    context: JObject,
) -> jint {
    if context_ready() {
        return JNI_OK;
    }

    let vm = match env.get_java_vm() {
        Ok(vm) => vm,
        Err(err) => {
            tracing::error!("nativeInit: failed to get JavaVM: {}", err);
            return JNI_ERR;
        }
    };
    let global = match env.new_global_ref(context) {
        Ok(global) => global,
        Err(err) => {
            tracing::error!("nativeInit: failed to pin context: {}", err);
            return JNI_ERR;
        }
    };

    // SAFETY: both pointers come from the live VM; the global reference is
    // leaked so the context stays valid for the life of the process.
    unsafe {
        ndk_context::initialize_android_context(
            vm.get_java_vm_pointer() as *mut c_void,
            global.as_obj().as_raw() as *mut c_void,
        );
    }
    std::mem::forget(global);

    CONTEXT_READY.store(true, Ordering::Release);
    tracing::info!("Android context initialized");
    JNI_OK
}
