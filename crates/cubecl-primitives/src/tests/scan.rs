use cubecl_core::prelude::*;
use rand::distr::Uniform;
use rand::{Rng, SeedableRng};

use crate::instructions::ScanInstruction;
use crate::reference;
use crate::{exclusive_scan, inclusive_scan, TempStorage};

#[macro_export]
macro_rules! testgen_primitives_scan {
    () => {
        mod scan {
            use super::*;
            use cubecl_core::prelude::*;

            $crate::testgen_primitives_scan!(@group: [ty = [u32, i32], sizes = [0, 1, 10, 256, 1024, 1025, 4097, 65_537]]: {
                Sum: |a, b| a.wrapping_add(b), 0;
                Min: |a, b| if b < a { b } else { a }, 100;
                Max: |a, b| if a < b { b } else { a }, 0;
            });
            $crate::testgen_primitives_scan!(@group: [ty = [f32], sizes = [0, 1, 10, 256, 1024, 1025, 4097]]: {
                Sum: |a, b| a + b, 0;
                Min: |a, b| if b < a { b } else { a }, 100;
            });
        }
    };
    (@group: [ty = [$($ty:ident),*], sizes = $sizes:expr]: $cases:tt) => {
        $(
            $crate::testgen_primitives_scan!(@type: [$ty, $sizes]: $cases);
        )*
    };
    (@type: [$ty:ident, $sizes:expr]: { $($instr:ident: $op:expr, $init:expr;)* }) => {
        $(
            ::paste::paste! {
                #[test]
                fn [<test_scan_ $ty _ $instr:lower>]() {
                    for size in $sizes {
                        let client = TestRuntime::client(&Default::default());
                        $crate::tests::scan::TestCase::new(size).test_scan::<
                            TestRuntime,
                            $ty,
                            $crate::instructions::$instr,
                        >(&client, $op, <$ty>::from_int($init));
                    }
                }
            }
        )*
    };
}

#[derive(Debug)]
pub struct TestCase {
    pub size: usize,
}

impl TestCase {
    pub fn new(size: usize) -> Self {
        Self { size }
    }

    /// Run both scan modes on the device and compare them against the
    /// left-to-right host references.
    pub fn test_scan<R: Runtime, N: Numeric + CubeElement, I: ScanInstruction>(
        &self,
        client: &ComputeClient<R::Server, R::Channel>,
        op: impl Fn(N, N) -> N + Copy,
        initial_value: N,
    ) {
        let data = rand::rngs::StdRng::seed_from_u64(7523)
            .sample_iter(Uniform::<i64>::new(1, 16).unwrap())
            .take(self.size)
            .map(|v| N::from_int(v))
            .collect::<Vec<_>>();

        let input = client.create(N::as_bytes(&data));
        let strides = [1];
        let shape = [self.size];
        let input_ref = unsafe {
            TensorHandleRef::<R>::from_raw_parts(&input, &strides, &shape, size_of::<N>())
        };

        for exclusive in [false, true] {
            let output = client.empty(self.size.max(1) * size_of::<N>());
            let output_ref = unsafe {
                TensorHandleRef::<R>::from_raw_parts(&output, &strides, &shape, size_of::<N>())
            };

            let mut bytes = 0;
            let run = |temp_storage: TempStorage<'_>, output_ref: &TensorHandleRef<R>| {
                if exclusive {
                    exclusive_scan::<R, N, I>(
                        client,
                        temp_storage,
                        &input_ref,
                        output_ref,
                        initial_value,
                        false,
                    )
                } else {
                    inclusive_scan::<R, N, I>(client, temp_storage, &input_ref, output_ref, false)
                }
            };
            run(TempStorage::SizeQuery(&mut bytes), &output_ref).unwrap();
            assert!(bytes >= 4, "size queries never report zero");
            let scratch = client.empty(bytes);
            run(TempStorage::Device(&scratch), &output_ref).unwrap();

            let expected = if exclusive {
                reference::exclusive_scan(&data, initial_value, op)
            } else {
                reference::inclusive_scan(&data, op)
            };

            let actual = client.read_one(output.clone());
            let actual = &N::from_bytes(&actual)[..self.size];
            assert_eq!(
                actual, &expected,
                "scan mismatch: size {}, exclusive {exclusive}",
                self.size
            );
        }
    }
}
