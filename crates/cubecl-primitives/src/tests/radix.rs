use cubecl_core::prelude::*;
use rand::distr::Uniform;
use rand::{Rng, SeedableRng};

use crate::radix::RadixKey;
use crate::reference;
use crate::{
    segmented_sort_keys, sort_keys, sort_keys_descending, sort_keys_double_buffer, sort_pairs,
    DoubleBuffer, TempStorage,
};

#[macro_export]
macro_rules! testgen_primitives_radix_sort {
    () => {
        mod radix_sort {
            use super::*;
            use cubecl_core::prelude::*;

            $crate::testgen_primitives_radix_sort!([
                (u32, u32, |k: u32| k as u64, new),
                (i32, i32, |k: i32| (k as u32 ^ 0x8000_0000) as u64, signed_case),
                (f32, f32, |k: f32| $crate::tests::radix::f32_to_bits(k), signed_case),
                (u16, u16, |k: u16| k as u64, new),
                (i16, i16, |k: i16| (k as u16 ^ 0x8000) as u64, signed_case),
                (u8, u8, |k: u8| k as u64, byte_case),
                (i8, i8, |k: i8| (k as u8 ^ 0x80) as u64, byte_signed_case),
                (u64, u64, |k: u64| k, new),
                (i64, i64, |k: i64| (k as u64) ^ 0x8000_0000_0000_0000, signed_case),
                (f64, f64, |k: f64| $crate::tests::radix::f64_to_bits(k), signed_case),
                (
                    f16,
                    $crate::tests::radix::f16,
                    |k| $crate::tests::radix::f16_to_bits(k),
                    signed_case
                ),
                (
                    bf16,
                    $crate::tests::radix::bf16,
                    |k| $crate::tests::radix::bf16_to_bits(k),
                    signed_case
                )
            ]);

            #[test]
            fn test_sort_u32_bit_subrange() {
                let client = TestRuntime::client(&Default::default());
                $crate::tests::radix::TestCase::new(4097)
                    .with_bits(4, 13)
                    .test_sort_keys::<TestRuntime, u32>(&client, |k: u32| k as u64, false);
                $crate::tests::radix::TestCase::new(1024)
                    .with_bits(7, 8)
                    .test_sort_keys::<TestRuntime, u32>(&client, |k: u32| k as u64, false);
            }

            #[test]
            fn test_sort_pairs_u32() {
                for size in [0usize, 1, 10, 1024, 4097, 65_537] {
                    let client = TestRuntime::client(&Default::default());
                    $crate::tests::radix::TestCase::new(size)
                        .test_sort_pairs::<TestRuntime, u32>(&client, |k: u32| k as u64);
                }
            }

            #[test]
            fn test_sort_keys_double_buffer_u32() {
                for size in [1usize, 10, 1024, 4097] {
                    let client = TestRuntime::client(&Default::default());
                    $crate::tests::radix::TestCase::new(size)
                        .test_sort_keys_double_buffer::<TestRuntime, u32>(&client, |k: u32| {
                            k as u64
                        });
                }
            }

            #[test]
            fn test_segmented_sort_f32() {
                for (size, segments) in [(0usize, 1usize), (8, 3), (100, 1), (100, 100), (4097, 13)] {
                    let client = TestRuntime::client(&Default::default());
                    $crate::tests::radix::TestCase::new(size).test_segmented_sort_keys::<
                        TestRuntime,
                        f32,
                    >(&client, $crate::tests::radix::f32_to_bits, segments);
                }
            }
        }
    };
    ([$(($name:ident, $ty:ty, $to_bits:expr, $case:ident)),*]) => {
        $(
            ::paste::paste! {
                #[test]
                fn [<test_sort_keys_ $name>]() {
                    for size in [0usize, 1, 2, 10, 255, 256, 257, 1024, 4097, 65_537] {
                        let client = TestRuntime::client(&Default::default());
                        $crate::tests::radix::TestCase::$case(size)
                            .test_sort_keys::<TestRuntime, $ty>(&client, $to_bits, false);
                    }
                }

                #[test]
                fn [<test_sort_keys_descending_ $name>]() {
                    for size in [0usize, 1, 10, 1024, 4097] {
                        let client = TestRuntime::client(&Default::default());
                        $crate::tests::radix::TestCase::$case(size)
                            .test_sort_keys::<TestRuntime, $ty>(&client, $to_bits, true);
                    }
                }
            }
        )*
    };
}

pub use crate::reference::{bf16_to_bits, f16_to_bits, f32_to_bits, f64_to_bits};
pub use half::{bf16, f16};

#[derive(Debug)]
pub struct TestCase {
    pub size: usize,
    pub begin_bit: Option<u32>,
    pub end_bit: Option<u32>,
    pub key_range: (i64, i64),
}

impl TestCase {
    pub fn new(size: usize) -> Self {
        Self {
            size,
            begin_bit: None,
            end_bit: None,
            key_range: (0, 10_000),
        }
    }

    pub fn with_bits(mut self, begin_bit: u32, end_bit: u32) -> Self {
        self.begin_bit = Some(begin_bit);
        self.end_bit = Some(end_bit);
        self
    }

    /// Keys drawn from a range crossing zero, covering the sign-flip paths
    /// of the key transform.
    pub fn signed_case(size: usize) -> Self {
        let mut case = Self::new(size);
        case.key_range = (-5_000, 5_000);
        case
    }

    /// Keys that fit an 8-bit type.
    pub fn byte_case(size: usize) -> Self {
        let mut case = Self::new(size);
        case.key_range = (0, 100);
        case
    }

    /// Keys that fit a signed 8-bit type, crossing zero.
    pub fn byte_signed_case(size: usize) -> Self {
        let mut case = Self::new(size);
        case.key_range = (-100, 100);
        case
    }

    fn bit_range<K>(&self) -> (u32, u32) {
        let key_bits = (size_of::<K>() * 8) as u32;
        (
            self.begin_bit.unwrap_or(0),
            self.end_bit.unwrap_or(key_bits),
        )
    }

    fn generate<K: Numeric>(&self) -> Vec<K> {
        let range = Uniform::<i64>::new(self.key_range.0, self.key_range.1).unwrap();
        rand::rngs::StdRng::seed_from_u64(86624)
            .sample_iter(range)
            .take(self.size)
            .map(|v| K::from_int(v))
            .collect()
    }

    pub fn test_sort_keys<R: Runtime, K: RadixKey + CubeElement + PartialEq>(
        &self,
        client: &ComputeClient<R::Server, R::Channel>,
        to_bits: impl Fn(K) -> u64,
        descending: bool,
    ) {
        let keys = self.generate::<K>();
        let (begin_bit, end_bit) = self.bit_range::<K>();
        let expected = reference::sort_by_bits(&keys, to_bits, begin_bit, end_bit, descending);

        let input = client.create(K::as_bytes(&keys));
        let output = client.empty(self.size.max(1) * size_of::<K>());
        let strides = [1];
        let shape = [self.size];
        let input_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&input, &strides, &shape, size_of::<K>())
        };
        let output_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&output, &strides, &shape, size_of::<K>())
        };

        let run = |temp_storage: TempStorage<'_>| {
            if descending {
                sort_keys_descending::<R, K>(
                    client,
                    temp_storage,
                    &input_ref,
                    &output_ref,
                    begin_bit,
                    end_bit,
                    false,
                )
            } else {
                sort_keys::<R, K>(
                    client,
                    temp_storage,
                    &input_ref,
                    &output_ref,
                    begin_bit,
                    end_bit,
                    false,
                )
            }
        };
        let mut bytes = 0;
        run(TempStorage::SizeQuery(&mut bytes)).unwrap();
        assert!(bytes >= 4);
        let scratch = client.empty(bytes);
        let in_output = run(TempStorage::Device(&scratch)).unwrap();
        assert!(in_output, "pointer-pair sorts land in the output buffer");

        let actual = client.read_one(output.clone());
        let actual = &K::from_bytes(&actual)[..self.size];
        assert_eq!(actual, &expected, "sort_keys, size {}", self.size);
    }

    /// Values are the source indices, so stability shows up directly in the
    /// value permutation.
    pub fn test_sort_pairs<R: Runtime, K: RadixKey + CubeElement + PartialEq>(
        &self,
        client: &ComputeClient<R::Server, R::Channel>,
        to_bits: impl Fn(K) -> u64,
    ) {
        let keys = self.generate::<K>();
        let values = (0..self.size as i64).map(u32::from_int).collect::<Vec<_>>();
        let (begin_bit, end_bit) = self.bit_range::<K>();
        let (expected_keys, expected_values) =
            reference::sort_pairs_by_bits(&keys, &values, to_bits, begin_bit, end_bit, false);

        let keys_in = client.create(K::as_bytes(&keys));
        let values_in = client.create(u32::as_bytes(&values));
        let keys_out = client.empty(self.size.max(1) * size_of::<K>());
        let values_out = client.empty(self.size.max(1) * size_of::<u32>());
        let strides = [1];
        let shape = [self.size];
        let keys_in_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&keys_in, &strides, &shape, size_of::<K>())
        };
        let values_in_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&values_in, &strides, &shape, size_of::<u32>())
        };
        let keys_out_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&keys_out, &strides, &shape, size_of::<K>())
        };
        let values_out_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&values_out, &strides, &shape, size_of::<u32>())
        };

        let run = |temp_storage: TempStorage<'_>| {
            sort_pairs::<R, K, u32>(
                client,
                temp_storage,
                &keys_in_ref,
                &keys_out_ref,
                &values_in_ref,
                &values_out_ref,
                begin_bit,
                end_bit,
                false,
            )
        };
        let mut bytes = 0;
        run(TempStorage::SizeQuery(&mut bytes)).unwrap();
        let scratch = client.empty(bytes);
        run(TempStorage::Device(&scratch)).unwrap();

        let actual_keys = client.read_one(keys_out.clone());
        let actual_keys = &K::from_bytes(&actual_keys)[..self.size];
        assert_eq!(actual_keys, &expected_keys);
        let actual_values = client.read_one(values_out.clone());
        let actual_values = &u32::from_bytes(&actual_values)[..self.size];
        assert_eq!(actual_values, &expected_values, "pair stability");
    }

    pub fn test_sort_keys_double_buffer<R: Runtime, K: RadixKey + CubeElement + PartialEq>(
        &self,
        client: &ComputeClient<R::Server, R::Channel>,
        to_bits: impl Fn(K) -> u64,
    ) {
        let keys = self.generate::<K>();
        let (begin_bit, end_bit) = self.bit_range::<K>();
        let expected = reference::sort_by_bits(&keys, to_bits, begin_bit, end_bit, false);

        let current = client.create(K::as_bytes(&keys));
        let alternate = client.empty(self.size.max(1) * size_of::<K>());
        let mut buffer = DoubleBuffer::new(&current, &alternate);

        let mut bytes = 0;
        sort_keys_double_buffer::<R, K>(
            client,
            TempStorage::SizeQuery(&mut bytes),
            &mut buffer,
            self.size,
            begin_bit,
            end_bit,
            false,
        )
        .unwrap();
        let scratch = client.empty(bytes);
        sort_keys_double_buffer::<R, K>(
            client,
            TempStorage::Device(&scratch),
            &mut buffer,
            self.size,
            begin_bit,
            end_bit,
            false,
        )
        .unwrap();

        // The selector names the buffer holding the sorted result.
        let actual = client.read_one(buffer.current().clone());
        let actual = &K::from_bytes(&actual)[..self.size];
        assert_eq!(actual, &expected, "double-buffer sort, size {}", self.size);
    }

    pub fn test_segmented_sort_keys<R: Runtime, K: RadixKey + CubeElement + PartialEq>(
        &self,
        client: &ComputeClient<R::Server, R::Channel>,
        to_bits: impl Fn(K) -> u64 + Copy,
        segments: usize,
    ) {
        let keys = self.generate::<K>();
        let (begin_bit, end_bit) = self.bit_range::<K>();

        // Random cut points partition the input into contiguous segments.
        let mut rng = rand::rngs::StdRng::seed_from_u64(53172);
        let mut offsets = vec![0u32; segments + 1];
        for offset in offsets[1..segments].iter_mut() {
            *offset = rng.random_range(0..=self.size as u32);
        }
        offsets[segments] = self.size as u32;
        offsets.sort_unstable();
        let begins = offsets[..segments].to_vec();
        let ends = offsets[1..].to_vec();

        let expected = reference::segmented_sort_by_bits(
            &keys, &begins, &ends, to_bits, begin_bit, end_bit, false,
        );

        let keys_in = client.create(K::as_bytes(&keys));
        let keys_out = client.create(K::as_bytes(&keys));
        let begins_handle = client.create(u32::as_bytes(&begins));
        let ends_handle = client.create(u32::as_bytes(&ends));
        let strides = [1];
        let shape = [self.size];
        let seg_shape = [segments];
        let keys_in_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&keys_in, &strides, &shape, size_of::<K>())
        };
        let keys_out_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&keys_out, &strides, &shape, size_of::<K>())
        };
        let begins_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(
                &begins_handle,
                &strides,
                &seg_shape,
                size_of::<u32>(),
            )
        };
        let ends_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&ends_handle, &strides, &seg_shape, size_of::<u32>())
        };

        let run = |temp_storage: TempStorage<'_>| {
            segmented_sort_keys::<R, K>(
                client,
                temp_storage,
                &keys_in_ref,
                &keys_out_ref,
                &begins_ref,
                &ends_ref,
                begin_bit,
                end_bit,
                false,
            )
        };
        let mut bytes = 0;
        run(TempStorage::SizeQuery(&mut bytes)).unwrap();
        let scratch = client.empty(bytes);
        run(TempStorage::Device(&scratch)).unwrap();

        let actual = client.read_one(keys_out.clone());
        let actual = &K::from_bytes(&actual)[..self.size];
        assert_eq!(
            actual, &expected,
            "segmented sort, size {}, segments {segments}",
            self.size
        );
    }
}
