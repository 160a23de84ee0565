//! Geometric utility objects.

use crate::num::SFloat;
use num;
use std::{
    fmt,
    ops::{Add, Div, Index, IndexMut, Mul, Neg, Sub},
};

#[cfg(feature = "serialization")]
use serde::Serialize;

#[cfg(any(feature = "for-testing", test))]
use approx::{AbsDiffEq, RelativeEq};

/// Denotes the x-, y- or z-dimension.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub enum Dim3 {
    X = 0,
    Y = 1,
    Z = 2,
}

impl Dim3 {
    /// Creates an array for iterating over the x-, y- and z-dimensions.
    pub fn slice() -> [Self; 3] {
        [Self::X, Self::Y, Self::Z]
    }

    /// Returns the number of the dimension.
    pub fn num(self) -> usize {
        self as usize
    }
}

impl fmt::Display for Dim3 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}",
            match self {
                Self::X => "x",
                Self::Y => "y",
                Self::Z => "z",
            }
        )
    }
}

use Dim3::{X, Y, Z};

/// Represents any quantity with three dimensional components.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct In3D<T>([T; 3]);

impl<T> In3D<T> {
    /// Creates a new 3D quantity given the three components.
    pub fn new(x: T, y: T, z: T) -> Self {
        Self([x, y, z])
    }

    /// Creates a new 3D quantity by evaluating the given component
    /// constructor for each dimension.
    pub fn with_each_component<C>(create_component: C) -> Self
    where
        C: Fn(Dim3) -> T,
    {
        Self::new(create_component(X), create_component(Y), create_component(Z))
    }

    /// Creates a new 3D quantity with the given value copied into all components.
    pub fn same(a: T) -> Self
    where
        T: Copy,
    {
        Self([a, a, a])
    }

    /// Creates a new tuple containing copies of the three components.
    pub fn to_tuple(&self) -> (T, T, T)
    where
        T: Copy,
    {
        (self[X], self[Y], self[Z])
    }
}

impl<T> Index<Dim3> for In3D<T> {
    type Output = T;
    fn index(&self, dim: Dim3) -> &Self::Output {
        &self.0[dim as usize]
    }
}

impl<T> IndexMut<Dim3> for In3D<T> {
    fn index_mut(&mut self, dim: Dim3) -> &mut Self::Output {
        &mut self.0[dim as usize]
    }
}

impl<'a, T> IntoIterator for &'a In3D<T> {
    type Item = &'a T;
    type IntoIter = ::std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<T: fmt::Display> fmt::Display for In3D<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self[X], self[Y], self[Z])
    }
}

#[cfg(any(feature = "for-testing", test))]
impl<T> AbsDiffEq for In3D<T>
where
    T: AbsDiffEq,
    T::Epsilon: Copy,
{
    type Epsilon = <T as AbsDiffEq>::Epsilon;

    fn default_epsilon() -> Self::Epsilon {
        T::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
        T::abs_diff_eq(&self[X], &other[X], epsilon)
            && T::abs_diff_eq(&self[Y], &other[Y], epsilon)
            && T::abs_diff_eq(&self[Z], &other[Z], epsilon)
    }
}

#[cfg(any(feature = "for-testing", test))]
impl<T> RelativeEq for In3D<T>
where
    T: RelativeEq,
    T::Epsilon: Copy,
{
    fn default_max_relative() -> Self::Epsilon {
        T::default_max_relative()
    }

    fn relative_eq(
        &self,
        other: &Self,
        epsilon: Self::Epsilon,
        max_relative: Self::Epsilon,
    ) -> bool {
        T::relative_eq(&self[X], &other[X], epsilon, max_relative)
            && T::relative_eq(&self[Y], &other[Y], epsilon, max_relative)
            && T::relative_eq(&self[Z], &other[Z], epsilon, max_relative)
    }
}

#[cfg(any(feature = "for-testing", test))]
macro_rules! impl_abs_diff_eq_3d {
    ($T:ident <$F:ident>) => {
        impl<$F> AbsDiffEq for $T<$F>
        where
            $F: SFloat + AbsDiffEq,
            $F::Epsilon: Copy,
        {
            type Epsilon = <In3D<$F> as AbsDiffEq>::Epsilon;

            fn default_epsilon() -> Self::Epsilon {
                In3D::<$F>::default_epsilon()
            }

            fn abs_diff_eq(&self, other: &Self, epsilon: Self::Epsilon) -> bool {
                In3D::<$F>::abs_diff_eq(&self.0, &other.0, epsilon)
            }
        }
    };
}

#[cfg(any(feature = "for-testing", test))]
macro_rules! impl_relative_eq_3d {
    ($T:ident <$F:ident>) => {
        impl<$F> RelativeEq for $T<$F>
        where
            $F: SFloat + RelativeEq,
            $F::Epsilon: Copy,
        {
            fn default_max_relative() -> Self::Epsilon {
                In3D::<$F>::default_max_relative()
            }

            fn relative_eq(
                &self,
                other: &Self,
                epsilon: Self::Epsilon,
                max_relative: Self::Epsilon,
            ) -> bool {
                In3D::<$F>::relative_eq(&self.0, &other.0, epsilon, max_relative)
            }
        }
    };
}

/// A 3D vector.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct Vec3<F>(In3D<F>);

impl<F: SFloat> Vec3<F> {
    /// Creates a new 3D vector given the three components.
    pub fn new(x: F, y: F, z: F) -> Self {
        Self(In3D::new(x, y, z))
    }

    /// Creates a new 3D vector by evaluating the given component
    /// constructor for each dimension.
    pub fn with_each_component<C>(create_component: C) -> Self
    where
        C: Fn(Dim3) -> F,
    {
        Self(In3D::with_each_component(create_component))
    }

    /// Creates a new zero vector.
    pub fn zero() -> Self {
        Self::new(F::zero(), F::zero(), F::zero())
    }

    /// Creates a new vector with all components equal to the given value.
    pub fn equal_components(a: F) -> Self {
        Self::new(a, a, a)
    }

    /// Constructs a new point from the vector components.
    pub fn to_point3(&self) -> Point3<F> {
        Point3::with_each_component(|dim| self[dim])
    }

    /// Computes the squared length of the vector.
    pub fn squared_length(&self) -> F {
        self[X] * self[X] + self[Y] * self[Y] + self[Z] * self[Z]
    }

    /// Computes the length of the vector.
    pub fn length(&self) -> F {
        self.squared_length().sqrt()
    }

    /// Computes the dot product of the vector with the given vector.
    pub fn dot(&self, other: &Self) -> F {
        self[X] * other[X] + self[Y] * other[Y] + self[Z] * other[Z]
    }
}

impl<F> Index<Dim3> for Vec3<F> {
    type Output = F;
    fn index(&self, dim: Dim3) -> &Self::Output {
        &self.0[dim]
    }
}

impl<F> IndexMut<Dim3> for Vec3<F> {
    fn index_mut(&mut self, dim: Dim3) -> &mut Self::Output {
        &mut self.0[dim]
    }
}

impl<F: fmt::Display> fmt::Display for Vec3<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

macro_rules! impl_vec3_add_sub {
    ($trait:ident, $method:ident) => {
        impl<F: SFloat> $trait<Vec3<F>> for Vec3<F> {
            type Output = Vec3<F>;
            fn $method(self, other: Vec3<F>) -> Self::Output {
                Vec3::with_each_component(|dim| F::$method(self[dim], other[dim]))
            }
        }

        impl<'a, F: SFloat> $trait<&'a Vec3<F>> for Vec3<F> {
            type Output = Vec3<F>;
            fn $method(self, other: &'a Vec3<F>) -> Self::Output {
                Vec3::with_each_component(|dim| F::$method(self[dim], other[dim]))
            }
        }

        impl<'a, F: SFloat> $trait<Vec3<F>> for &'a Vec3<F> {
            type Output = Vec3<F>;
            fn $method(self, other: Vec3<F>) -> Self::Output {
                Vec3::with_each_component(|dim| F::$method(self[dim], other[dim]))
            }
        }

        impl<'a, 'b, F: SFloat> $trait<&'b Vec3<F>> for &'a Vec3<F> {
            type Output = Vec3<F>;
            fn $method(self, other: &'b Vec3<F>) -> Self::Output {
                Vec3::with_each_component(|dim| F::$method(self[dim], other[dim]))
            }
        }
    };
}

impl_vec3_add_sub!(Add, add);
impl_vec3_add_sub!(Sub, sub);

impl<F: SFloat> Mul<F> for Vec3<F> {
    type Output = Vec3<F>;
    fn mul(self, factor: F) -> Self::Output {
        Vec3::with_each_component(|dim| self[dim] * factor)
    }
}

impl<F: SFloat> Mul<F> for &Vec3<F> {
    type Output = Vec3<F>;
    fn mul(self, factor: F) -> Self::Output {
        Vec3::with_each_component(|dim| self[dim] * factor)
    }
}

impl<F: SFloat> Div<F> for Vec3<F> {
    type Output = Vec3<F>;
    fn div(self, divisor: F) -> Self::Output {
        Vec3::with_each_component(|dim| self[dim] / divisor)
    }
}

impl<F: SFloat> Div<F> for &Vec3<F> {
    type Output = Vec3<F>;
    fn div(self, divisor: F) -> Self::Output {
        Vec3::with_each_component(|dim| self[dim] / divisor)
    }
}

impl<F: SFloat> Neg for Vec3<F> {
    type Output = Vec3<F>;
    fn neg(self) -> Self::Output {
        Vec3::with_each_component(|dim| -self[dim])
    }
}

impl<F: SFloat> Neg for &Vec3<F> {
    type Output = Vec3<F>;
    fn neg(self) -> Self::Output {
        Vec3::with_each_component(|dim| -self[dim])
    }
}

#[cfg(any(feature = "for-testing", test))]
impl_abs_diff_eq_3d!(Vec3<F>);
#[cfg(any(feature = "for-testing", test))]
impl_relative_eq_3d!(Vec3<F>);

/// A 3D spatial coordinate.
#[derive(Clone, Debug, PartialEq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct Point3<F>(In3D<F>);

impl<F: SFloat> Point3<F> {
    /// Creates a new 3D point given the three components.
    pub fn new(x: F, y: F, z: F) -> Self {
        Self(In3D::new(x, y, z))
    }

    /// Creates a new 3D point by evaluating the given component
    /// constructor for each dimension.
    pub fn with_each_component<C>(create_component: C) -> Self
    where
        C: Fn(Dim3) -> F,
    {
        Self(In3D::with_each_component(create_component))
    }

    /// Creates a new point at the origin.
    pub fn origin() -> Self {
        Self::new(F::zero(), F::zero(), F::zero())
    }

    /// Constructs a new vector from the point components.
    pub fn to_vec3(&self) -> Vec3<F> {
        Vec3::with_each_component(|dim| self[dim])
    }
}

impl<F> Index<Dim3> for Point3<F> {
    type Output = F;
    fn index(&self, dim: Dim3) -> &Self::Output {
        &self.0[dim]
    }
}

impl<F> IndexMut<Dim3> for Point3<F> {
    fn index_mut(&mut self, dim: Dim3) -> &mut Self::Output {
        &mut self.0[dim]
    }
}

impl<F: fmt::Display> fmt::Display for Point3<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

macro_rules! impl_point3_vec3_op {
    ($trait:ident, $method:ident) => {
        impl<F: SFloat> $trait<Vec3<F>> for Point3<F> {
            type Output = Point3<F>;
            fn $method(self, vector: Vec3<F>) -> Self::Output {
                Point3::with_each_component(|dim| F::$method(self[dim], vector[dim]))
            }
        }

        impl<'a, F: SFloat> $trait<&'a Vec3<F>> for Point3<F> {
            type Output = Point3<F>;
            fn $method(self, vector: &'a Vec3<F>) -> Self::Output {
                Point3::with_each_component(|dim| F::$method(self[dim], vector[dim]))
            }
        }

        impl<'a, F: SFloat> $trait<Vec3<F>> for &'a Point3<F> {
            type Output = Point3<F>;
            fn $method(self, vector: Vec3<F>) -> Self::Output {
                Point3::with_each_component(|dim| F::$method(self[dim], vector[dim]))
            }
        }

        impl<'a, 'b, F: SFloat> $trait<&'b Vec3<F>> for &'a Point3<F> {
            type Output = Point3<F>;
            fn $method(self, vector: &'b Vec3<F>) -> Self::Output {
                Point3::with_each_component(|dim| F::$method(self[dim], vector[dim]))
            }
        }
    };
}

impl_point3_vec3_op!(Add, add);
impl_point3_vec3_op!(Sub, sub);

impl<'a, 'b, F: SFloat> Sub<&'b Point3<F>> for &'a Point3<F> {
    type Output = Vec3<F>;
    fn sub(self, other: &'b Point3<F>) -> Self::Output {
        Vec3::with_each_component(|dim| self[dim] - other[dim])
    }
}

#[cfg(any(feature = "for-testing", test))]
impl_abs_diff_eq_3d!(Point3<F>);
#[cfg(any(feature = "for-testing", test))]
impl_relative_eq_3d!(Point3<F>);

/// A 3D index.
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serialization", derive(Serialize))]
pub struct Idx3<I>(In3D<I>);

impl<I: num::Integer + Copy> Idx3<I> {
    /// Creates a new 3D index given the three components.
    pub fn new(i: I, j: I, k: I) -> Self {
        Self(In3D::new(i, j, k))
    }

    /// Creates a new 3D index by evaluating the given component
    /// constructor for each dimension.
    pub fn with_each_component<C>(create_component: C) -> Self
    where
        C: Fn(Dim3) -> I,
    {
        Self(In3D::with_each_component(create_component))
    }

    /// Creates a new tuple containing copies of the three components.
    pub fn to_tuple(&self) -> (I, I, I) {
        self.0.to_tuple()
    }
}

impl<I> Index<Dim3> for Idx3<I> {
    type Output = I;
    fn index(&self, dim: Dim3) -> &Self::Output {
        &self.0[dim]
    }
}

impl<I> IndexMut<Dim3> for Idx3<I> {
    fn index_mut(&mut self, dim: Dim3) -> &mut Self::Output {
        &mut self.0[dim]
    }
}

impl<I: fmt::Display> fmt::Display for Idx3<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}
