use mockall::mock;
use x86emu_core::modules::{HostEnvironment, ModuleImage};

mock! {
    pub Host {}
    impl HostEnvironment for Host {
        fn find_resident(&self, name: &str) -> Option<u32>;
        fn load_library(&mut self, name: &str) -> Option<u32>;
        fn inspect(&self, base: u32) -> Option<ModuleImage>;
    }
}
