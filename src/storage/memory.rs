use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{ Arc, Mutex };

use super::{ ObjectBackend, StoreError };

#[derive(Default)]
struct Inner {
    bucket: bool,
    refuse_create: bool,
    broken: bool,
    buckets_created: usize,
    objects: HashMap<String, (Vec<u8>, String)>,
}

/// In-process stand-in for a bucket.
pub struct MemoryBackend {
    inner: Mutex<Inner>,
}

impl MemoryBackend {
    fn build(inner: Inner) -> Arc<Self> {
        Arc::new(Self { inner: Mutex::new(inner) })
    }

    pub fn with_bucket() -> Arc<Self> {
        Self::build(Inner { bucket: true, ..Default::default() })
    }

    pub fn without_bucket() -> Arc<Self> {
        Self::build(Inner::default())
    }

    pub fn refusing_bucket_creation() -> Arc<Self> {
        Self::build(Inner { refuse_create: true, ..Default::default() })
    }

    /// Every call fails as if the network were down.
    pub fn broken() -> Arc<Self> {
        Self::build(Inner { bucket: true, broken: true, ..Default::default() })
    }

    pub fn buckets_created(&self) -> usize {
        self.inner.lock().unwrap().buckets_created
    }

    pub fn object(&self, name: &str) -> Option<(Vec<u8>, String)> {
        self.inner.lock().unwrap().objects.get(name).cloned()
    }

    fn check(&self) -> Result<std::sync::MutexGuard<'_, Inner>, StoreError> {
        let inner = self.inner.lock().unwrap();
        if inner.broken {
            return Err(StoreError::Http { status: 503, message: "backend offline".into() });
        }
        Ok(inner)
    }
}

#[async_trait]
impl ObjectBackend for MemoryBackend {
    fn bucket(&self) -> &str {
        "bucket"
    }

    fn location(&self, name: &str) -> String {
        format!("memory://bucket/{}", name)
    }

    async fn object_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self.check()?.objects.contains_key(name))
    }

    async fn read_object(&self, name: &str) -> Result<Vec<u8>, StoreError> {
        self.check()?
            .objects.get(name)
            .map(|(body, _)| body.clone())
            .ok_or_else(|| StoreError::Http { status: 404, message: "No such object".into() })
    }

    async fn write_object(
        &self,
        name: &str,
        body: Vec<u8>,
        content_type: &str
    ) -> Result<(), StoreError> {
        let mut inner = self.check()?;
        if !inner.bucket {
            return Err(StoreError::Http { status: 404, message: "No such bucket".into() });
        }
        inner.objects.insert(name.to_string(), (body, content_type.to_string()));
        Ok(())
    }

    async fn bucket_exists(&self) -> Result<bool, StoreError> {
        Ok(self.check()?.bucket)
    }

    async fn create_bucket(&self) -> Result<(), StoreError> {
        let mut inner = self.check()?;
        if inner.refuse_create {
            return Err(StoreError::BucketCreate {
                bucket: "bucket".into(),
                reason: "permission denied".into(),
            });
        }
        inner.bucket = true;
        inner.buckets_created += 1;
        Ok(())
    }
}
