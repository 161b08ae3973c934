macro_rules! impl_backend {
    () => {
        fn backend(&self) -> &Backend {
            self.kernel.backend()
        }
    };
}

pub(crate) use impl_backend;
