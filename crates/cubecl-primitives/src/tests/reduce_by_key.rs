use cubecl_core::prelude::*;
use rand::distr::Uniform;
use rand::{Rng, SeedableRng};

use crate::instructions::ScanInstruction;
use crate::reference;
use crate::{reduce_by_key, TempStorage};

#[macro_export]
macro_rules! testgen_primitives_reduce_by_key {
    () => {
        mod reduce_by_key {
            use super::*;
            use cubecl_core::prelude::*;

            $crate::testgen_primitives_reduce_by_key!([
                (u32, u32),
                (i32, f32),
                (u32, i32)
            ]);

            #[test]
            fn test_reduce_by_key_all_equal() {
                let client = TestRuntime::client(&Default::default());
                $crate::tests::reduce_by_key::TestCase::all_equal(65_537)
                    .test_reduce_by_key::<TestRuntime, u32, u32, $crate::instructions::Sum>(
                        &client,
                        |a, b| a.wrapping_add(b),
                    );
            }
        }
    };
    ([$(($key:ident, $value:ident)),*]) => {
        $(
            ::paste::paste! {
                #[test]
                fn [<test_reduce_by_key_ $key _ $value>]() {
                    for size in [0usize, 1, 2, 10, 256, 1024, 1025, 4097, 65_537] {
                        let client = TestRuntime::client(&Default::default());
                        $crate::tests::reduce_by_key::TestCase::new(size)
                            .test_reduce_by_key::<TestRuntime, $key, $value, $crate::instructions::Sum>(
                                &client,
                                |a, b| $crate::tests::reduce_by_key::host_add(a, b),
                            );
                    }
                }
            }
        )*
    };
}

/// Addition for the host reference. Test values are small enough that no
/// integer run can overflow.
pub fn host_add<V: Numeric>(a: V, b: V) -> V {
    a + b
}

#[derive(Debug)]
pub struct TestCase {
    pub size: usize,
    pub all_equal: bool,
}

impl TestCase {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            all_equal: false,
        }
    }

    /// A single run spanning every batch, the worst case for carry chains.
    pub fn all_equal(size: usize) -> Self {
        Self {
            size,
            all_equal: true,
        }
    }

    pub fn test_reduce_by_key<
        R: Runtime,
        K: Numeric + CubeElement + PartialEq,
        V: Numeric + CubeElement + PartialEq,
        Rd: ScanInstruction,
    >(
        &self,
        client: &ComputeClient<R::Server, R::Channel>,
        op: impl Fn(V, V) -> V,
    ) {
        let mut rng = rand::rngs::StdRng::seed_from_u64(91750);
        let run_length = Uniform::<u64>::new(1, 6).unwrap();
        let value_dist = Uniform::<i64>::new(0, 8).unwrap();

        // Runs of random length over strictly changing keys.
        let mut keys = Vec::with_capacity(self.size);
        let mut key = 0i64;
        while keys.len() < self.size {
            let length = if self.all_equal {
                self.size as u64
            } else {
                rng.sample(run_length)
            };
            for _ in 0..length {
                if keys.len() == self.size {
                    break;
                }
                keys.push(K::from_int(key));
            }
            key += 1 + (rng.sample(value_dist) % 3);
        }
        let values = (0..self.size)
            .map(|_| V::from_int(rng.sample(value_dist)))
            .collect::<Vec<_>>();

        let (expected_uniques, expected_aggregates) =
            reference::reduce_by_key(&keys, &values, op);

        let keys_handle = client.create(K::as_bytes(&keys));
        let values_handle = client.create(V::as_bytes(&values));
        let uniques_handle = client.empty(self.size.max(1) * size_of::<K>());
        let aggregates_handle = client.empty(self.size.max(1) * size_of::<V>());
        let count_handle = client.empty(size_of::<u32>());

        let strides = [1];
        let shape = [self.size];
        let count_shape = [1];
        let keys_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&keys_handle, &strides, &shape, size_of::<K>())
        };
        let values_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&values_handle, &strides, &shape, size_of::<V>())
        };
        let uniques_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&uniques_handle, &strides, &shape, size_of::<K>())
        };
        let aggregates_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(
                &aggregates_handle,
                &strides,
                &shape,
                size_of::<V>(),
            )
        };
        let count_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(
                &count_handle,
                &strides,
                &count_shape,
                size_of::<u32>(),
            )
        };

        let run = |temp_storage: TempStorage<'_>| {
            reduce_by_key::<R, K, V, Rd>(
                client,
                temp_storage,
                &keys_ref,
                &values_ref,
                &uniques_ref,
                &aggregates_ref,
                &count_ref,
                false,
            )
        };
        let mut bytes = 0;
        run(TempStorage::SizeQuery(&mut bytes)).unwrap();
        assert!(bytes >= 4);
        let scratch = client.empty(bytes);
        run(TempStorage::Device(&scratch)).unwrap();

        let count = client.read_one(count_handle.clone());
        let count = u32::from_bytes(&count)[0] as usize;
        assert_eq!(count, expected_uniques.len(), "unique count, size {}", self.size);

        let uniques = client.read_one(uniques_handle.clone());
        let uniques = &K::from_bytes(&uniques)[..count];
        assert_eq!(uniques, &expected_uniques, "unique keys, size {}", self.size);

        let aggregates = client.read_one(aggregates_handle.clone());
        let aggregates = &V::from_bytes(&aggregates)[..count];
        assert_eq!(
            aggregates, &expected_aggregates,
            "aggregates, size {}",
            self.size
        );
    }
}
